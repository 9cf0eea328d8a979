//! [`VectorStore`] implementation over a single Qdrant collection.

use crate::qdrant::payload::split_payload;
use crate::qdrant::types::{PointQuery, QdrantError};
use crate::qdrant::QdrantService;
use crate::store::{ScoredDocument, SearchParams, StoreError, VectorRecord, VectorStore};
use async_trait::async_trait;

/// Store backed by a remote Qdrant collection with cosine distance.
pub struct QdrantVectorStore {
    service: QdrantService,
    collection: String,
}

impl QdrantVectorStore {
    /// Store for `collection` on the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>, collection: &str) -> Result<Self, QdrantError> {
        Ok(Self {
            service: QdrantService::new(url, api_key)?,
            collection: collection.to_string(),
        })
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), StoreError> {
        let existing = self
            .service
            .create_collection_if_not_exists(&self.collection, dimension as u64)
            .await?;
        match existing {
            Some(size) if size != dimension => Err(StoreError::DimensionMismatch {
                expected: size,
                actual: dimension,
            }),
            _ => Ok(()),
        }
    }

    async fn add(&self, records: Vec<VectorRecord>) -> Result<usize, StoreError> {
        Ok(self.service.index_points(&self.collection, records).await?)
    }

    async fn query(
        &self,
        vector: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        let query = PointQuery {
            vector: vector.to_vec(),
            limit: params.k,
            score_threshold: params.score_threshold,
            mmr: params.mmr.map(|mmr| {
                (
                    1.0 - mmr.lambda_mult.clamp(0.0, 1.0),
                    mmr.fetch_k.max(params.k),
                )
            }),
        };
        let points = self.service.search_points(&self.collection, query).await?;
        Ok(points
            .into_iter()
            .map(|point| {
                let (text, metadata) = split_payload(point.payload);
                ScoredDocument {
                    id: point.id,
                    text,
                    metadata,
                    score: point.score,
                }
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.service.count_points(&self.collection).await?)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Ok(self.service.delete_collection(&self.collection).await?)
    }
}
