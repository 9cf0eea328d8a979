use crate::llm::{ChatClient, ChatMessage, ChatRequest, ImageData};
use crate::metrics::PipelineMetrics;
use crate::processing::{ContentBundle, ORIGINAL_CONTENT_KEY};
use crate::store::ScoredDocument;
use std::sync::Arc;

/// Literal reply requested when the documents do not answer the question.
pub const INSUFFICIENT_INFORMATION_MESSAGE: &str =
    "I don't have enough information to answer that question based on the provided documents.";

/// Returned in place of an answer whenever the model call fails.
pub const ANSWER_FAILURE_MESSAGE: &str =
    "Sorry, I encountered an error while generating the answer.";

/// Answers from the original text, tables, and images of retrieved chunks.
pub struct MultimodalAnswerer {
    chat: Arc<dyn ChatClient>,
    metrics: Option<Arc<PipelineMetrics>>,
}

/// Content recovered from one retrieved document.
struct Recovered {
    text: String,
    tables: Vec<String>,
    images: Vec<String>,
}

impl MultimodalAnswerer {
    /// Answerer calling the vision-capable `chat` client.
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self {
            chat,
            metrics: None,
        }
    }

    /// Count answered questions in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Answer `query` from `documents`. Never fails; errors yield [`ANSWER_FAILURE_MESSAGE`].
    pub async fn answer(&self, query: &str, documents: &[ScoredDocument]) -> String {
        let recovered: Vec<Recovered> = documents.iter().map(recover).collect();
        let prompt = build_prompt(query, &recovered);
        let images: Vec<ImageData> = recovered
            .iter()
            .flat_map(|doc| doc.images.iter())
            .map(ImageData::from_base64)
            .collect();
        let image_count = images.len();
        let request = ChatRequest::new(vec![ChatMessage::user_with_images(prompt, images)]);

        match self.chat.complete(request).await {
            Ok(answer) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_answer();
                }
                tracing::info!(
                    documents = documents.len(),
                    images = image_count,
                    "Generated multi-modal answer"
                );
                answer
            }
            Err(error) => {
                tracing::error!(error = %error, "Answer generation failed");
                ANSWER_FAILURE_MESSAGE.to_string()
            }
        }
    }
}

fn recover(document: &ScoredDocument) -> Recovered {
    let bundle = document
        .metadata
        .get(ORIGINAL_CONTENT_KEY)
        .and_then(|value| value.as_str())
        .and_then(|json| match ContentBundle::from_metadata_json(json) {
            Ok(bundle) => Some(bundle),
            Err(error) => {
                tracing::warn!(id = %document.id, error = %error, "Unreadable original content");
                None
            }
        });

    match bundle {
        Some(bundle) => Recovered {
            text: bundle.raw_text,
            tables: bundle.tables_html,
            images: bundle.images_base64,
        },
        None => Recovered {
            text: document.text.clone(),
            tables: Vec::new(),
            images: Vec::new(),
        },
    }
}

fn build_prompt(query: &str, documents: &[Recovered]) -> String {
    let mut prompt = format!(
        "Based on the following documents, please answer this question: {query}\n\n\
         CONTENT TO ANALYZE:\n"
    );

    for (index, document) in documents.iter().enumerate() {
        prompt.push_str(&format!("--- Document {} ---\n", index + 1));
        if !document.text.is_empty() {
            prompt.push_str(&format!("TEXT:\n{}\n\n", document.text));
        }
        if !document.tables.is_empty() {
            prompt.push_str("TABLES:\n");
            for (table_index, table) in document.tables.iter().enumerate() {
                prompt.push_str(&format!("Table {}:\n{table}\n\n", table_index + 1));
            }
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\nPlease provide a clear, comprehensive answer using only the text, tables, and images \
         above. Do not use outside knowledge. If the documents don't contain sufficient \
         information to answer the question, say \
         \"{INSUFFICIENT_INFORMATION_MESSAGE}\"\n\n\
         ANSWER:"
    ));
    prompt
}
