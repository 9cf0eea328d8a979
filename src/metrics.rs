use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    summaries_generated: AtomicU64,
    summary_fallbacks: AtomicU64,
    questions_answered: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished ingestion run over `documents` sources that wrote `chunks` records.
    pub fn record_ingestion(&self, documents: u64, chunks: u64) {
        self.documents_ingested.fetch_add(documents, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunks, Ordering::Relaxed);
    }

    /// Record a summary produced by the language model.
    pub fn record_summary(&self) {
        self.summaries_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a summary that fell back to truncated raw text.
    pub fn record_summary_fallback(&self) {
        self.summary_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            summaries_generated: self.summaries_generated.load(Ordering::Relaxed),
            summary_fallbacks: self.summary_fallbacks.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Source documents ingested since startup.
    pub documents_ingested: u64,
    /// Total chunks written to the vector store.
    pub chunks_indexed: u64,
    /// Chunks whose search text was written by the language model.
    pub summaries_generated: u64,
    /// Chunks whose summary call failed and used the truncated fallback.
    pub summary_fallbacks: u64,
    /// Questions answered since startup.
    pub questions_answered: u64,
}
