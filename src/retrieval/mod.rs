//! Query-time lookup against the vector store.

use crate::config::RetrievalSettings;
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::llm::ChatClientError;
use crate::store::{MmrParams, ScoredDocument, SearchParams, StoreError, VectorStore};
use std::sync::Arc;
use thiserror::Error;

mod multi_query;

pub use multi_query::{MultiQueryResult, MultiQueryRetriever};

/// Default number of documents returned per query.
pub const DEFAULT_K: usize = 5;

/// Errors raised while retrieving documents.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Search parameters are out of range.
    #[error("Invalid retrieval parameter: {0}")]
    InvalidParameter(String),
    /// Query embedding failed.
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vector for the query.
    #[error("Embedding provider returned no vector for the query")]
    EmptyEmbedding,
    /// Vector store lookup failed.
    #[error("Vector store query failed: {0}")]
    Store(#[from] StoreError),
    /// Query variation call failed.
    #[error("Failed to generate query variations: {0}")]
    Generation(#[from] ChatClientError),
    /// Query variation output did not match the expected schema.
    #[error("Malformed query variations: {0}")]
    MalformedVariations(String),
}

/// How candidates are selected from the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    /// Top `k` by cosine similarity.
    Similarity,
    /// Top `k` with similarity at least the given value in `[0, 1]`.
    ScoreThreshold(f32),
    /// Diversity-balanced selection from a larger candidate pool.
    Mmr {
        /// Candidate pool size.
        fetch_k: usize,
        /// Relevance weight in `[0, 1]`.
        lambda_mult: f32,
    },
}

/// Parameters for one retrieval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalOptions {
    /// Maximum number of documents returned.
    pub k: usize,
    /// Selection strategy.
    pub mode: SearchMode,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::similarity(DEFAULT_K)
    }
}

impl RetrievalOptions {
    /// Plain similarity search returning `k` documents.
    pub const fn similarity(k: usize) -> Self {
        Self {
            k,
            mode: SearchMode::Similarity,
        }
    }

    /// Similarity search dropping results below `threshold`.
    pub const fn with_threshold(k: usize, threshold: f32) -> Self {
        Self {
            k,
            mode: SearchMode::ScoreThreshold(threshold),
        }
    }

    /// Diversity-balanced search using the configured pool and balance.
    pub fn mmr(k: usize, settings: &RetrievalSettings) -> Self {
        Self {
            k,
            mode: SearchMode::Mmr {
                fetch_k: settings.fetch_k,
                lambda_mult: settings.lambda_mult,
            },
        }
    }

    fn validate(&self) -> Result<SearchParams, RetrievalError> {
        if self.k == 0 {
            return Err(RetrievalError::InvalidParameter(
                "k must be greater than zero".into(),
            ));
        }
        let mut params = SearchParams::top_k(self.k);
        match self.mode {
            SearchMode::Similarity => {}
            SearchMode::ScoreThreshold(threshold) => {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(RetrievalError::InvalidParameter(format!(
                        "score threshold must be within 0..=1, got {threshold}"
                    )));
                }
                params.score_threshold = Some(threshold);
            }
            SearchMode::Mmr {
                fetch_k,
                lambda_mult,
            } => {
                if !(0.0..=1.0).contains(&lambda_mult) {
                    return Err(RetrievalError::InvalidParameter(format!(
                        "lambda_mult must be within 0..=1, got {lambda_mult}"
                    )));
                }
                params.mmr = Some(MmrParams {
                    fetch_k: fetch_k.max(self.k),
                    lambda_mult,
                });
            }
        }
        Ok(params)
    }
}

/// Embeds queries and looks them up in a store.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    /// Retriever pairing the indexing embedder with its store.
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Documents for `query`, best first, at most `options.k`.
    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        let params = options.validate()?;
        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(RetrievalError::EmptyEmbedding)?;

        let documents = self.store.query(&vector, &params).await?;
        tracing::info!(
            k = options.k,
            mode = ?options.mode,
            results = documents.len(),
            "Retrieved documents"
        );
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::store::{LocalVectorStore, VectorRecord};
    use serde_json::Map;

    async fn seeded_store(dir: &std::path::Path, texts: &[&str]) -> Arc<dyn VectorStore> {
        let embedder = HashEmbeddingClient::new(16);
        let store = Arc::new(LocalVectorStore::new(dir, "retrieval"));
        store.ensure_collection(16).await.expect("collection");
        let vectors = embedder
            .generate_embeddings(texts.iter().map(|text| text.to_string()).collect())
            .await
            .expect("vectors");
        let records = texts
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (text, vector))| VectorRecord {
                id: format!("doc-{index}"),
                text: text.to_string(),
                metadata: Map::new(),
                vector,
            })
            .collect();
        store.add(records).await.expect("add");
        store
    }

    const CORPUS: [&str; 7] = [
        "Tesla revenue grew in Q3",
        "Tesla revenue grew in Q4",
        "Microsoft released a mouse",
        "Google indexes the web",
        "SpaceX launched Starship",
        "Nvidia ships GPUs",
        "Tesla revenue grew in Q3",
    ];

    #[tokio::test]
    async fn similarity_returns_at_most_k_in_descending_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = seeded_store(dir.path(), &CORPUS).await;
        let retriever = Retriever::new(Arc::new(HashEmbeddingClient::new(16)), store);

        let documents = retriever
            .retrieve("Tesla revenue grew in Q3", &RetrievalOptions::default())
            .await
            .expect("documents");

        assert_eq!(documents.len(), DEFAULT_K);
        assert_eq!(documents[0].text, "Tesla revenue grew in Q3");
        assert!(documents.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[tokio::test]
    async fn threshold_excludes_weak_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = seeded_store(dir.path(), &CORPUS).await;
        let retriever = Retriever::new(Arc::new(HashEmbeddingClient::new(16)), store);

        let documents = retriever
            .retrieve(
                "Tesla revenue grew in Q3",
                &RetrievalOptions::with_threshold(5, 0.99),
            )
            .await
            .expect("documents");

        assert_eq!(documents.len(), 3);
        assert!(documents.iter().all(|doc| doc.score >= 0.99));
        assert!(documents.iter().all(|doc| doc.text.starts_with("Tesla")));
    }

    #[tokio::test]
    async fn mmr_skips_exact_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = seeded_store(dir.path(), &CORPUS).await;
        let retriever = Retriever::new(Arc::new(HashEmbeddingClient::new(16)), store);
        let options = RetrievalOptions {
            k: 2,
            mode: SearchMode::Mmr {
                fetch_k: 7,
                lambda_mult: 0.25,
            },
        };

        let documents = retriever
            .retrieve("Tesla revenue grew in Q3", &options)
            .await
            .expect("documents");

        assert_eq!(documents.len(), 2);
        assert_ne!(documents[0].text, documents[1].text);
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        assert!(RetrievalOptions::similarity(0).validate().is_err());
        assert!(RetrievalOptions::with_threshold(3, 1.5).validate().is_err());
        let mmr = RetrievalOptions {
            k: 3,
            mode: SearchMode::Mmr {
                fetch_k: 1,
                lambda_mult: 0.5,
            },
        };
        let params = mmr.validate().expect("params");
        assert_eq!(params.mmr.map(|mmr| mmr.fetch_k), Some(3));
    }
}
