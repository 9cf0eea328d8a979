use super::{ConversationError, Turn};
use crate::llm::{ChatClient, ChatMessage, ChatRequest};
use std::sync::Arc;

const REWRITE_INSTRUCTION: &str = "Given the chat history, rewrite the new input to be standalone \
     and searchable. Just return the rewritten input.";

/// Turns follow-up questions into self-contained search queries.
pub struct QueryRewriter {
    chat: Arc<dyn ChatClient>,
}

impl QueryRewriter {
    /// Rewriter calling `chat`.
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }

    /// Standalone form of `utterance` given `history`.
    ///
    /// With no history the utterance is returned verbatim and no call is made.
    pub async fn rewrite(
        &self,
        utterance: &str,
        history: &[Turn],
    ) -> Result<String, ConversationError> {
        if history.is_empty() {
            return Ok(utterance.to_string());
        }

        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        messages.push(ChatMessage::system(REWRITE_INSTRUCTION));
        for turn in history {
            messages.push(ChatMessage::user(turn.user.clone()));
            messages.push(ChatMessage::assistant(turn.assistant.clone()));
        }
        messages.push(ChatMessage::user(format!("New input: {utterance}")));

        let rewritten = self
            .chat
            .complete(ChatRequest::new(messages))
            .await
            .map_err(ConversationError::Rewrite)?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            tracing::warn!("Rewrite came back empty; searching with the original input");
            return Ok(utterance.to_string());
        }
        tracing::debug!(original = utterance, rewritten, "Rewrote query");
        Ok(rewritten.to_string())
    }
}
