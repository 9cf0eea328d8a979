//! Vector store contract and backend selection.

use crate::config::{Config, VectorStoreKind};
use crate::qdrant::{QdrantError, QdrantVectorStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

mod local;
pub mod mmr;

pub use local::LocalVectorStore;

/// Errors raised by vector store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the persisted collection failed.
    #[error("Vector store I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Persisted collection could not be encoded or decoded.
    #[error("Vector store data is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Vector length does not match the collection.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the collection.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Collection has not been created yet.
    #[error("Collection '{0}' does not exist")]
    MissingCollection(String),
    /// Store settings are unusable.
    #[error("Vector store misconfigured: {0}")]
    Configuration(String),
    /// Remote Qdrant request failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
}

/// Record written to a store: search text, metadata, and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier.
    pub id: String,
    /// Text the vector was computed from.
    pub text: String,
    /// Arbitrary metadata kept alongside the text.
    pub metadata: Map<String, Value>,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

/// Search hit returned from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    /// Record identifier.
    pub id: String,
    /// Stored search text.
    pub text: String,
    /// Stored metadata.
    pub metadata: Map<String, Value>,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Diversity-balanced selection settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmrParams {
    /// Size of the candidate pool ranked by relevance.
    pub fetch_k: usize,
    /// Relevance weight in `[0, 1]`; `1.0` ignores diversity.
    pub lambda_mult: f32,
}

/// Parameters of a single store query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    /// Maximum number of results.
    pub k: usize,
    /// Drop results scoring below this similarity.
    pub score_threshold: Option<f32>,
    /// Re-rank candidates for diversity.
    pub mmr: Option<MmrParams>,
}

impl SearchParams {
    /// Plain top-`k` similarity search.
    pub const fn top_k(k: usize) -> Self {
        Self {
            k,
            score_threshold: None,
            mmr: None,
        }
    }
}

/// Persisted collection of embedded records.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection when missing; fail if it exists with another dimension.
    async fn ensure_collection(&self, dimension: usize) -> Result<(), StoreError>;

    /// Append records, returning how many were written.
    async fn add(&self, records: Vec<VectorRecord>) -> Result<usize, StoreError>;

    /// Records most similar to `vector`, best first.
    async fn query(
        &self,
        vector: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<ScoredDocument>, StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Drop every record and the collection itself.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Build the store selected by `VECTOR_STORE`.
pub fn get_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>, StoreError> {
    tracing::debug!(
        backend = ?config.vector_store,
        collection = %config.collection_name,
        "Initializing vector store"
    );
    let store: Arc<dyn VectorStore> = match config.vector_store {
        VectorStoreKind::Local => Arc::new(LocalVectorStore::new(
            &config.vector_store_path,
            &config.collection_name,
        )),
        VectorStoreKind::Qdrant => {
            let url = config
                .qdrant_url
                .as_deref()
                .ok_or_else(|| StoreError::Configuration("QDRANT_URL is not set".into()))?;
            Arc::new(QdrantVectorStore::new(
                url,
                config.qdrant_api_key.clone(),
                &config.collection_name,
            )?)
        }
    };
    Ok(store)
}
