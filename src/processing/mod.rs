//! Document processing pipeline: loading, splitting, title chunking, classification,
//! summarization, and indexing.

pub mod classify;
pub mod export;
pub mod indexer;
pub mod loader;
pub mod semantic;
mod service;
pub mod splitter;
pub mod summarize;
pub mod title_chunker;
pub mod types;

pub use classify::{ContentBundle, ContentType, classify};
pub use indexer::{IndexOutcome, Indexer, ORIGINAL_CONTENT_KEY};
pub use service::{IngestionService, PdfIngestOptions};
pub use summarize::{Summarizer, Summary, SummarySource};
pub use title_chunker::{Chunk, TitleChunkerOptions, chunk_by_title};
pub use types::{ChunkingError, EnhancedChunk, IngestionReport, ProcessingError, TextChunk};
