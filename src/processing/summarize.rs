//! Search-text generation for multi-modal chunks.
//!
//! Text-only chunks are indexed as-is. Chunks with tables or images get a dense description
//! from a vision-capable model; when that call fails the chunk still gets indexed with a
//! truncated preview annotated with its table and image counts.

use crate::llm::{ChatClient, ChatMessage, ChatRequest, ImageData};
use crate::metrics::PipelineMetrics;
use crate::processing::classify::ContentBundle;
use std::sync::Arc;

const FALLBACK_PREVIEW_CHARS: usize = 300;

/// How a search text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    /// Raw text used unchanged.
    Passthrough,
    /// Written by the language model.
    Generated,
    /// Deterministic preview after a failed model call.
    Fallback,
}

/// Search text plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Text to embed.
    pub text: String,
    /// How `text` was produced.
    pub source: SummarySource,
}

/// Writes searchable descriptions for chunks.
pub struct Summarizer {
    chat: Arc<dyn ChatClient>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl Summarizer {
    /// Summarizer calling `chat` for multi-modal chunks.
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self {
            chat,
            metrics: None,
        }
    }

    /// Count generated and fallback summaries in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Search text for a classified chunk.
    pub async fn summarize_bundle(&self, bundle: &ContentBundle) -> Summary {
        self.summarize(&bundle.raw_text, &bundle.tables_html, &bundle.images_base64)
            .await
    }

    /// Search text for `raw_text` with its tables and images. Never fails.
    pub async fn summarize(&self, raw_text: &str, tables: &[String], images: &[String]) -> Summary {
        if tables.is_empty() && images.is_empty() {
            return Summary {
                text: raw_text.to_string(),
                source: SummarySource::Passthrough,
            };
        }

        let prompt = build_summary_prompt(raw_text, tables);
        let image_parts: Vec<ImageData> = images.iter().map(ImageData::from_base64).collect();
        let mut request =
            ChatRequest::new(vec![ChatMessage::user_with_images(prompt, image_parts)]);
        request.temperature = Some(0.0);

        match self.chat.complete(request).await {
            Ok(text) if !text.trim().is_empty() => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_summary();
                }
                Summary {
                    text,
                    source: SummarySource::Generated,
                }
            }
            Ok(_) => self.fallback(raw_text, tables.len(), images.len(), "empty completion"),
            Err(error) => self.fallback(raw_text, tables.len(), images.len(), &error.to_string()),
        }
    }

    fn fallback(&self, raw_text: &str, tables: usize, images: usize, reason: &str) -> Summary {
        tracing::warn!(
            error = reason,
            tables,
            images,
            "Summary generation failed; using truncated preview"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_summary_fallback();
        }
        Summary {
            text: fallback_summary(raw_text, tables, images),
            source: SummarySource::Fallback,
        }
    }
}

/// First 300 characters plus `...`, annotated with table and image counts.
pub fn fallback_summary(raw_text: &str, tables: usize, images: usize) -> String {
    let preview: String = raw_text.chars().take(FALLBACK_PREVIEW_CHARS).collect();
    let mut summary = format!("{preview}...");
    if tables > 0 {
        summary.push_str(&format!(" [Contains {tables} table(s)]"));
    }
    if images > 0 {
        summary.push_str(&format!(" [Contains {images} image(s)]"));
    }
    summary
}

fn build_summary_prompt(raw_text: &str, tables: &[String]) -> String {
    let mut prompt = String::from(
        "You are creating a searchable description for document content retrieval.\n\n\
         CONTENT TO ANALYZE:\n\
         TEXT CONTENT:\n",
    );
    prompt.push_str(raw_text);
    prompt.push_str("\n\n");

    if !tables.is_empty() {
        prompt.push_str("TABLES:\n");
        for (index, table) in tables.iter().enumerate() {
            prompt.push_str(&format!("Table {}:\n{table}\n\n", index + 1));
        }
    }

    prompt.push_str(
        "YOUR TASK:\n\
         Generate a comprehensive, searchable description that covers:\n\n\
         1. Key facts, numbers, and data points from text and tables\n\
         2. Main topics and concepts discussed\n\
         3. Questions this content could answer\n\
         4. Visual content analysis (charts, diagrams, patterns in images)\n\
         5. Alternative search terms users might use\n\n\
         Make it detailed and searchable - prioritize findability over brevity.\n\n\
         SEARCHABLE DESCRIPTION:",
    );
    prompt
}
