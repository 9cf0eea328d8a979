//! Core data types and error definitions for the processing pipeline.

use crate::embedding::EmbeddingClientError;
use crate::partition::PartitionError;
use crate::processing::classify::ContentBundle;
use crate::processing::summarize::SummarySource;
use crate::store::StoreError;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning raw text or elements into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunking configured an impossible size budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new content in every chunk.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        chunk_size: usize,
    },
    /// Breakpoint percentile outside `[0, 100]`.
    #[error("breakpoint percentile must be within 0..=100, got {0}")]
    InvalidPercentile(f32),
    /// Semantic chunking could not embed its sentence groups.
    #[error("failed to embed sentence groups: {0}")]
    Embedding(#[from] EmbeddingClientError),
}

/// Errors emitted by the ingestion pipelines.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Input directory or file is missing or empty.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Reading input documents failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Partitioning the PDF failed.
    #[error("Failed to partition document: {0}")]
    Partition(#[from] PartitionError),
    /// Embedding provider failed to produce vectors for the input text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store write failed.
    #[error("Vector store request failed: {0}")]
    Store(#[from] StoreError),
    /// Metadata or export serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A piece of a plain-text document ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Path of the source document.
    pub source: String,
    /// Position of the chunk within its document, starting at 0.
    pub chunk_index: usize,
    /// Chunk content.
    pub text: String,
}

/// A multi-modal chunk paired with its search text.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedChunk {
    /// 1-based position within the document.
    pub chunk_id: usize,
    /// Search text used for embedding; a summary or the raw text.
    pub enhanced_content: String,
    /// Original content reconstructed at answer time.
    pub bundle: ContentBundle,
    /// Source document path.
    pub source: String,
    /// How `enhanced_content` was produced.
    pub summary_source: SummarySource,
}

/// Summary of a completed ingestion run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IngestionReport {
    /// Documents read.
    pub documents: usize,
    /// Chunks produced before de-duplication.
    pub chunks: usize,
    /// Records written to the store.
    pub indexed: usize,
    /// Chunks skipped as duplicates or blank.
    pub skipped: usize,
}
