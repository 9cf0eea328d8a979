//! Embedding and persistence of chunks into the configured vector store.

use crate::embedding::EmbeddingClient;
use crate::processing::types::{EnhancedChunk, ProcessingError, TextChunk};
use crate::qdrant::payload::{compute_chunk_hash, current_timestamp_rfc3339, generate_record_id};
use crate::store::{VectorRecord, VectorStore};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

const DEFAULT_BATCH_SIZE: usize = 64;

/// Metadata key holding the serialized [`crate::processing::ContentBundle`].
pub const ORIGINAL_CONTENT_KEY: &str = "original_content";

/// Outcome of one indexing call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    /// Records written to the store.
    pub indexed: usize,
    /// Inputs dropped as blank or duplicate.
    pub skipped: usize,
}

/// Search text plus metadata waiting for its vector.
struct PendingRecord {
    text: String,
    metadata: Map<String, Value>,
}

/// Writes chunks to a [`VectorStore`] using one embedding client.
pub struct Indexer {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl Indexer {
    /// Indexer embedding with `embedder` and writing into `store`.
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Number of texts per embedding request; zero keeps the default.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        if batch_size > 0 {
            self.batch_size = batch_size;
        }
        self
    }

    /// Index plain-text chunks, dropping repeated chunk text within this call.
    pub async fn index_text_chunks(
        &self,
        chunks: Vec<TextChunk>,
    ) -> Result<IndexOutcome, ProcessingError> {
        let total = chunks.len();
        let ingested_at = current_timestamp_rfc3339();
        let pending: Vec<PendingRecord> = dedupe_chunks(chunks)
            .into_iter()
            .map(|(chunk, chunk_hash)| {
                let mut metadata = Map::new();
                metadata.insert("source".into(), Value::String(chunk.source));
                metadata.insert("chunk_index".into(), Value::from(chunk.chunk_index));
                metadata.insert("chunk_hash".into(), Value::String(chunk_hash));
                metadata.insert("ingested_at".into(), Value::String(ingested_at.clone()));
                PendingRecord {
                    text: chunk.text,
                    metadata,
                }
            })
            .collect();

        let indexed = self.write(pending).await?;
        Ok(IndexOutcome {
            indexed,
            skipped: total - indexed,
        })
    }

    /// Index multi-modal chunks with their full content bundle kept in metadata.
    pub async fn index_enhanced(
        &self,
        chunks: Vec<EnhancedChunk>,
    ) -> Result<IndexOutcome, ProcessingError> {
        let total = chunks.len();
        let ingested_at = current_timestamp_rfc3339();
        let mut pending = Vec::with_capacity(total);

        for chunk in chunks {
            if chunk.enhanced_content.trim().is_empty() {
                tracing::warn!(chunk_id = chunk.chunk_id, "Skipping chunk with blank search text");
                continue;
            }
            let mut metadata = Map::new();
            metadata.insert(
                ORIGINAL_CONTENT_KEY.into(),
                Value::String(chunk.bundle.to_metadata_json()?),
            );
            metadata.insert("chunk_id".into(), Value::from(chunk.chunk_id));
            metadata.insert("source".into(), Value::String(chunk.source));
            metadata.insert(
                "content_types".into(),
                Value::from(chunk.bundle.type_labels()),
            );
            metadata.insert(
                "summary_source".into(),
                serde_json::to_value(chunk.summary_source)?,
            );
            metadata.insert("ingested_at".into(), Value::String(ingested_at.clone()));
            pending.push(PendingRecord {
                text: chunk.enhanced_content,
                metadata,
            });
        }

        let indexed = self.write(pending).await?;
        Ok(IndexOutcome {
            indexed,
            skipped: total - indexed,
        })
    }

    async fn write(&self, pending: Vec<PendingRecord>) -> Result<usize, ProcessingError> {
        if pending.is_empty() {
            tracing::info!("Nothing to index");
            return Ok(0);
        }

        self.store.ensure_collection(self.embedder.dimension()).await?;

        let mut written = 0;
        let mut remaining = pending.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<PendingRecord> = remaining.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|record| record.text.clone()).collect();
            let vectors = self.embedder.generate_embeddings(texts).await?;

            let records: Vec<VectorRecord> = batch
                .into_iter()
                .zip(vectors)
                .map(|(record, vector)| VectorRecord {
                    id: generate_record_id(),
                    text: record.text,
                    metadata: record.metadata,
                    vector,
                })
                .collect();
            written += self.store.add(records).await?;
            tracing::debug!(written, "Indexed embedding batch");
        }

        tracing::info!(indexed = written, "Chunks indexed");
        Ok(written)
    }
}

/// Drop blank and repeated chunk texts, keeping the first occurrence with its hash.
fn dedupe_chunks(chunks: Vec<TextChunk>) -> Vec<(TextChunk, String)> {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();

    for chunk in chunks {
        if chunk.text.trim().is_empty() {
            tracing::warn!(
                source = %chunk.source,
                chunk_index = chunk.chunk_index,
                "Skipping blank chunk"
            );
            continue;
        }
        let hash = compute_chunk_hash(&chunk.text);
        if seen.insert(hash.clone()) {
            prepared.push((chunk, hash));
        } else {
            tracing::debug!(
                source = %chunk.source,
                chunk_index = chunk.chunk_index,
                "Skipping duplicate chunk"
            );
        }
    }

    prepared
}
