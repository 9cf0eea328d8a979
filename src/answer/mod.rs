//! Answer generation from retrieved documents.
//!
//! [`MultimodalAnswerer`] rebuilds each hit's original text, tables, and images from its
//! metadata and never fails; [`AnswerGenerator`] answers from search text alone and propagates
//! provider errors.

use crate::llm::{ChatClient, ChatClientError, ChatMessage, ChatRequest};
use crate::metrics::PipelineMetrics;
use crate::store::ScoredDocument;
use std::sync::Arc;

mod multimodal;

pub use multimodal::{
    ANSWER_FAILURE_MESSAGE, INSUFFICIENT_INFORMATION_MESSAGE, MultimodalAnswerer,
};

/// Reply the plain-text generator is told to use when documents lack the answer.
pub const NOT_FOUND_MESSAGE: &str = "Information not found in the documents.";

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that provides answers based on the provided documents.";

/// Answers questions from the search text of retrieved documents.
pub struct AnswerGenerator {
    chat: Arc<dyn ChatClient>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl AnswerGenerator {
    /// Generator calling `chat` once per question.
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

    /// Answer `query` using only `documents`.
    pub async fn answer(
        &self,
        query: &str,
        documents: &[ScoredDocument],
    ) -> Result<String, ChatClientError> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_answer_prompt(query, documents)),
        ]);
        let answer = self.chat.complete(request).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_answer();
        }
        tracing::info!(documents = documents.len(), "Generated answer");
        Ok(answer)
    }
}

fn build_answer_prompt(query: &str, documents: &[ScoredDocument]) -> String {
    let joined = documents
        .iter()
        .map(|document| document.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Based on the following documents, answer the Query: {query}\n\n\
         Documents: {joined}\n\n\
         Provide a clear answer using only the information from the documents above. \
         If the information is not available, respond with '{NOT_FOUND_MESSAGE}'"
    )
}
