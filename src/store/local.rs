//! Directory-backed vector store with exact cosine search.
//!
//! Each collection is one JSON document, `<dir>/<collection>.json`, holding the dimension, the
//! distance metric, and every record. Writes go to a temporary sibling file that is renamed over
//! the original, so a crash never leaves a half-written collection behind. The store assumes a
//! single writer per directory.

use super::mmr::{cosine_similarity, mmr_select};
use super::{ScoredDocument, SearchParams, StoreError, VectorRecord, VectorStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const DISTANCE: &str = "cosine";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedCollection {
    dimension: usize,
    distance: String,
    records: Vec<VectorRecord>,
}

/// Vector store persisted as a JSON file inside a directory.
pub struct LocalVectorStore {
    dir: PathBuf,
    collection: String,
    cache: RwLock<Option<PersistedCollection>>,
}

impl LocalVectorStore {
    /// Store for `collection` inside `dir`; nothing is read until first use.
    pub fn new(dir: impl AsRef<Path>, collection: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            collection: collection.to_string(),
            cache: RwLock::new(None),
        }
    }

    /// Path of the collection file.
    pub fn collection_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.collection))
    }

    async fn load(&self) -> Result<Option<PersistedCollection>, StoreError> {
        let path = self.collection_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn persist(&self, collection: &PersistedCollection) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.collection_path();
        let temp = self.dir.join(format!(".{}.json.tmp", self.collection));
        let bytes = serde_json::to_vec(collection)?;
        tokio::fs::write(&temp, bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: temp.clone(),
                source,
            })?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|source| StoreError::Io { path, source })
    }

    /// Populate the cache from disk when it is still empty.
    async fn ensure_loaded(&self) -> Result<(), StoreError> {
        if self.cache.read().await.is_some() {
            return Ok(());
        }
        let loaded = self.load().await?;
        let mut cache = self.cache.write().await;
        if cache.is_none() {
            *cache = loaded;
        }
        Ok(())
    }
}

fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), StoreError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(StoreError::DimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), StoreError> {
        self.ensure_loaded().await?;
        let mut cache = self.cache.write().await;
        match cache.as_ref() {
            Some(existing) if existing.dimension != dimension => {
                Err(StoreError::DimensionMismatch {
                    expected: existing.dimension,
                    actual: dimension,
                })
            }
            Some(_) => Ok(()),
            None => {
                let collection = PersistedCollection {
                    dimension,
                    distance: DISTANCE.to_string(),
                    records: Vec::new(),
                };
                self.persist(&collection).await?;
                tracing::debug!(
                    path = %self.collection_path().display(),
                    dimension,
                    "Created local collection"
                );
                *cache = Some(collection);
                Ok(())
            }
        }
    }

    async fn add(&self, records: Vec<VectorRecord>) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.ensure_loaded().await?;
        let mut cache = self.cache.write().await;
        let collection = cache
            .as_mut()
            .ok_or_else(|| StoreError::MissingCollection(self.collection.clone()))?;
        for record in &records {
            check_dimension(collection.dimension, &record.vector)?;
        }

        let added = records.len();
        let previous = collection.records.len();
        collection.records.extend(records);
        if let Err(error) = self.persist(collection).await {
            collection.records.truncate(previous);
            return Err(error);
        }

        tracing::debug!(
            collection = %self.collection,
            added,
            total = collection.records.len(),
            "Records persisted"
        );
        Ok(added)
    }

    async fn query(
        &self,
        vector: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        self.ensure_loaded().await?;
        let cache = self.cache.read().await;
        let collection = cache
            .as_ref()
            .ok_or_else(|| StoreError::MissingCollection(self.collection.clone()))?;
        check_dimension(collection.dimension, vector)?;

        let mut scored: Vec<(f32, &VectorRecord)> = collection
            .records
            .iter()
            .map(|record| (cosine_similarity(vector, &record.vector), record))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(threshold) = params.score_threshold {
            scored.retain(|(score, _)| *score >= threshold);
        }

        let chosen: Vec<(f32, &VectorRecord)> = match params.mmr {
            Some(mmr) => {
                scored.truncate(mmr.fetch_k.max(params.k));
                let candidates: Vec<&[f32]> = scored
                    .iter()
                    .map(|(_, record)| record.vector.as_slice())
                    .collect();
                mmr_select(vector, &candidates, params.k, mmr.lambda_mult)
                    .into_iter()
                    .map(|index| scored[index])
                    .collect()
            }
            None => {
                scored.truncate(params.k);
                scored
            }
        };

        Ok(chosen
            .into_iter()
            .map(|(score, record)| ScoredDocument {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.ensure_loaded().await?;
        Ok(self
            .cache
            .read()
            .await
            .as_ref()
            .map(|collection| collection.records.len())
            .unwrap_or(0))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let path = self.collection_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(StoreError::Io { path, source }),
        }
        *self.cache.write().await = None;
        tracing::info!(collection = %self.collection, "Cleared local collection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MmrParams;
    use serde_json::{Map, Value};

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        let mut metadata = Map::new();
        metadata.insert("source".into(), Value::String(format!("{id}.txt")));
        VectorRecord {
            id: id.to_string(),
            text: format!("text {id}"),
            metadata,
            vector,
        }
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::new(dir.path(), "docs");
        store.ensure_collection(2).await.expect("collection");
        store
            .add(vec![record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])])
            .await
            .expect("add");

        let reopened = LocalVectorStore::new(dir.path(), "docs");
        assert_eq!(reopened.count().await.expect("count"), 2);
        let hits = reopened
            .query(&[1.0, 0.1], &SearchParams::top_k(1))
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].metadata["source"], "a.txt");
        assert!(!dir.path().join(".docs.json.tmp").exists());
    }

    #[tokio::test]
    async fn results_are_ordered_and_bounded_by_k() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::new(dir.path(), "docs");
        store.ensure_collection(2).await.expect("collection");
        let records = (0..8)
            .map(|i| {
                let angle = i as f32 * 0.2;
                record(&format!("r{i}"), vec![angle.cos(), angle.sin()])
            })
            .collect();
        store.add(records).await.expect("add");

        let hits = store
            .query(&[1.0, 0.0], &SearchParams::top_k(5))
            .await
            .expect("query");
        assert_eq!(hits.len(), 5);
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
        assert_eq!(hits[0].id, "r0");
    }

    #[tokio::test]
    async fn threshold_filters_low_scores() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::new(dir.path(), "docs");
        store.ensure_collection(2).await.expect("collection");
        store
            .add(vec![record("near", vec![1.0, 0.0]), record("far", vec![0.0, 1.0])])
            .await
            .expect("add");

        let params = SearchParams {
            k: 5,
            score_threshold: Some(0.5),
            mmr: None,
        };
        let hits = store.query(&[1.0, 0.0], &params).await.expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "near");
    }

    #[tokio::test]
    async fn mmr_prefers_diverse_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::new(dir.path(), "docs");
        store.ensure_collection(2).await.expect("collection");
        store
            .add(vec![
                record("top", vec![1.0, 0.2]),
                record("dup", vec![1.0, 0.21]),
                record("other", vec![0.6, -0.8]),
            ])
            .await
            .expect("add");

        let params = SearchParams {
            k: 2,
            score_threshold: None,
            mmr: Some(MmrParams {
                fetch_k: 3,
                lambda_mult: 0.3,
            }),
        };
        let hits = store.query(&[1.0, 0.2], &params).await.expect("query");
        let ids: Vec<_> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "other"]);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::new(dir.path(), "docs");
        store.ensure_collection(2).await.expect("collection");
        let error = store.add(vec![record("bad", vec![1.0, 0.0, 0.0])]).await.unwrap_err();
        assert!(matches!(error, StoreError::DimensionMismatch { expected: 2, actual: 3 }));
        assert!(matches!(
            store.ensure_collection(3).await.unwrap_err(),
            StoreError::DimensionMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::new(dir.path(), "docs");
        store.ensure_collection(2).await.expect("collection");
        store.add(vec![record("a", vec![1.0, 0.0])]).await.expect("add");

        let temp = dir.path().join(".docs.json.tmp");
        std::fs::create_dir(&temp).expect("block temp file");
        let error = store
            .add(vec![record("b", vec![0.0, 1.0]), record("c", vec![0.5, 0.5])])
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::Io { .. }));
        assert_eq!(store.count().await.expect("count"), 1);

        std::fs::remove_dir(&temp).expect("unblock temp file");
        store.add(vec![record("d", vec![0.0, 1.0])]).await.expect("add");
        let reopened = LocalVectorStore::new(dir.path(), "docs");
        let hits = reopened
            .query(&[0.0, 1.0], &SearchParams::top_k(5))
            .await
            .expect("query");
        let ids: Vec<_> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a"]);
    }

    #[tokio::test]
    async fn clear_removes_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::new(dir.path(), "docs");
        store.ensure_collection(2).await.expect("collection");
        store.add(vec![record("a", vec![1.0, 0.0])]).await.expect("add");
        store.clear().await.expect("clear");

        assert_eq!(store.count().await.expect("count"), 0);
        assert!(!store.collection_path().exists());
        assert!(matches!(
            store.query(&[1.0, 0.0], &SearchParams::top_k(1)).await.unwrap_err(),
            StoreError::MissingCollection(_)
        ));
    }
}
