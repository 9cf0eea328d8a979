//! Ingestion service coordinating loading, chunking, summarization, and indexing.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    metrics::PipelineMetrics,
    partition::Partitioner,
    processing::{
        classify::classify,
        export::export_chunks,
        indexer::Indexer,
        loader::load_documents,
        splitter::TextSplitter,
        summarize::Summarizer,
        title_chunker::{TitleChunkerOptions, chunk_by_title},
        types::{EnhancedChunk, IngestionReport, ProcessingError, TextChunk},
    },
    store::{VectorStore, get_vector_store},
};
use std::path::Path;
use std::sync::Arc;

/// Runs the plain-text and multi-modal ingestion pipelines.
///
/// The service owns the embedding client, vector store, and splitter so the CLI builds it once
/// per process. Multi-modal runs additionally take a [`Partitioner`] and a [`Summarizer`] since
/// only they need the document-partitioning service and a vision-capable model.
pub struct IngestionService {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
    title_options: TitleChunkerOptions,
    batch_size: usize,
    metrics: Arc<PipelineMetrics>,
}

/// Options for a multi-modal PDF run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfIngestOptions<'a> {
    /// Write processed chunks to this JSON file before indexing.
    pub export: Option<&'a Path>,
    /// Clear the store before writing.
    pub reset: bool,
}

impl IngestionService {
    /// Service built from explicit components.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        splitter: TextSplitter,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            embedder,
            store,
            splitter,
            title_options: TitleChunkerOptions::default(),
            batch_size: 0,
            metrics,
        }
    }

    /// Service wired from the process configuration.
    pub fn from_config(
        config: &Config,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self, ProcessingError> {
        tracing::info!("Initializing embedding client");
        let embedder = get_embedding_client(config)?;
        let store = get_vector_store(config)?;
        let splitter = TextSplitter::from_settings(&config.splitter, embedder.clone())?;
        let title_options = TitleChunkerOptions::from_settings(&config.title_chunking)?;
        Ok(Self::new(embedder, store, splitter, metrics)
            .with_title_options(title_options)
            .with_batch_size(config.embedding_batch_size))
    }

    /// Override the title chunker limits.
    pub fn with_title_options(mut self, options: TitleChunkerOptions) -> Self {
        self.title_options = options;
        self
    }

    /// Texts per embedding request; zero uses the indexer default.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Store this service writes into.
    pub fn store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    /// Embedding client shared with retrieval.
    pub fn embedder(&self) -> Arc<dyn EmbeddingClient> {
        self.embedder.clone()
    }

    fn indexer(&self) -> Indexer {
        Indexer::new(self.embedder.clone(), self.store.clone()).with_batch_size(self.batch_size)
    }

    /// Split one text with the configured strategy.
    pub async fn split(&self, text: &str) -> Result<Vec<String>, ProcessingError> {
        Ok(self.splitter.split_text(text).await?)
    }

    /// Load, split, embed, and index every `*.txt` file in `dir`.
    pub async fn ingest_directory(
        &self,
        dir: &Path,
        reset: bool,
    ) -> Result<IngestionReport, ProcessingError> {
        let documents = load_documents(dir)?;

        let mut chunks = Vec::new();
        for document in &documents {
            let source = document.source.display().to_string();
            let pieces = self.split(&document.content).await?;
            tracing::debug!(source = %source, chunks = pieces.len(), "Split document");
            chunks.extend(
                pieces
                    .into_iter()
                    .enumerate()
                    .map(|(chunk_index, text)| TextChunk {
                        source: source.clone(),
                        chunk_index,
                        text,
                    }),
            );
        }
        let chunk_count = chunks.len();

        self.reset_if_requested(reset).await?;
        let outcome = self.indexer().index_text_chunks(chunks).await?;
        self.metrics
            .record_ingestion(documents.len() as u64, outcome.indexed as u64);

        let report = IngestionReport {
            documents: documents.len(),
            chunks: chunk_count,
            indexed: outcome.indexed,
            skipped: outcome.skipped,
        };
        tracing::info!(
            dir = %dir.display(),
            documents = report.documents,
            chunks = report.chunks,
            indexed = report.indexed,
            skipped = report.skipped,
            "Directory ingested"
        );
        Ok(report)
    }

    /// Partition, chunk, classify, and summarize one PDF without indexing it.
    pub async fn process_pdf(
        &self,
        path: &Path,
        partitioner: &dyn Partitioner,
        summarizer: &Summarizer,
    ) -> Result<Vec<EnhancedChunk>, ProcessingError> {
        let elements = partitioner.partition(path).await?;
        let chunks = chunk_by_title(&elements, &self.title_options);
        tracing::info!(
            path = %path.display(),
            elements = elements.len(),
            chunks = chunks.len(),
            "Chunked document by title"
        );

        let source = path.display().to_string();
        let mut enhanced = Vec::with_capacity(chunks.len());
        for (position, chunk) in chunks.iter().enumerate() {
            let bundle = classify(chunk);
            tracing::debug!(
                chunk_id = position + 1,
                types = ?bundle.type_labels(),
                tables = bundle.tables_html.len(),
                images = bundle.images_base64.len(),
                "Classified chunk"
            );
            let summary = summarizer.summarize_bundle(&bundle).await;
            enhanced.push(EnhancedChunk {
                chunk_id: position + 1,
                enhanced_content: summary.text,
                bundle,
                source: source.clone(),
                summary_source: summary.source,
            });
        }
        Ok(enhanced)
    }

    /// Full multi-modal pipeline for one PDF.
    pub async fn ingest_pdf(
        &self,
        path: &Path,
        partitioner: &dyn Partitioner,
        summarizer: &Summarizer,
        options: PdfIngestOptions<'_>,
    ) -> Result<IngestionReport, ProcessingError> {
        let enhanced = self.process_pdf(path, partitioner, summarizer).await?;
        if let Some(export) = options.export {
            export_chunks(export, &enhanced)?;
        }
        let chunk_count = enhanced.len();

        self.reset_if_requested(options.reset).await?;
        let outcome = self.indexer().index_enhanced(enhanced).await?;
        self.metrics.record_ingestion(1, outcome.indexed as u64);

        let report = IngestionReport {
            documents: 1,
            chunks: chunk_count,
            indexed: outcome.indexed,
            skipped: outcome.skipped,
        };
        tracing::info!(
            path = %path.display(),
            chunks = report.chunks,
            indexed = report.indexed,
            "PDF ingested"
        );
        Ok(report)
    }

    async fn reset_if_requested(&self, reset: bool) -> Result<(), ProcessingError> {
        if reset {
            tracing::warn!("Clearing vector store before ingestion");
            self.store.clear().await?;
        }
        Ok(())
    }
}
