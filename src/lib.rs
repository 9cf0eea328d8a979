#![deny(missing_docs)]

//! Core library for the Rusty RAG pipelines: plain-text and multi-modal ingestion, retrieval
//! strategies, and (conversational) answer generation.

/// Answer generation from retrieved documents.
pub mod answer;
/// Environment-driven configuration management.
pub mod config;
/// History-aware query rewriting and conversation sessions.
pub mod conversation;
/// Embedding client abstraction and adapters.
pub mod embedding;
mod http;
/// Language-model client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline counters.
pub mod metrics;
/// PDF partitioning into typed elements.
pub mod partition;
/// Document processing pipeline utilities.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Similarity, threshold, diversity, and multi-query retrieval.
pub mod retrieval;
/// Vector store contract and local backend.
pub mod store;
