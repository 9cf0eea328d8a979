//! Qdrant vector store integration.

pub mod client;
pub mod payload;
mod store;
pub mod types;

pub use client::QdrantService;
pub use payload::compute_chunk_hash;
pub use store::QdrantVectorStore;
pub use types::{PointQuery, QdrantError, ScoredPoint};
