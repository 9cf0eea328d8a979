//! History-aware question answering.
//!
//! A [`ConversationSession`] owns the turn history and the policy bounding it. Each call to
//! [`ConversationalRag::ask`] rewrites the utterance into a standalone query, retrieves,
//! answers, and then records the turn in the session.

use crate::answer::AnswerGenerator;
use crate::llm::ChatClientError;
use crate::retrieval::{RetrievalError, RetrievalOptions, Retriever};
use crate::store::ScoredDocument;
use anyhow::Error as TokenizerError;
use thiserror::Error;

mod policy;
mod rewriter;

pub use policy::{HistoryPolicy, SlidingWindow, TokenBudget, Unbounded, policy_from_kind};
pub use rewriter::QueryRewriter;

/// Errors raised while handling a conversational turn.
#[derive(Debug, Error)]
pub enum ConversationError {
    /// Query rewriting call failed.
    #[error("Failed to rewrite query: {0}")]
    Rewrite(#[source] ChatClientError),
    /// Retrieval for the standalone query failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// Answer generation call failed.
    #[error("Failed to generate answer: {0}")]
    Answer(#[source] ChatClientError),
    /// Token encoding tables could not be loaded.
    #[error("Failed to load tokenizer: {source}")]
    Tokenizer {
        /// Underlying tokenizer error.
        #[source]
        source: TokenizerError,
    },
}

/// One completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// What the user typed.
    pub user: String,
    /// The answer shown to the user.
    pub assistant: String,
}

/// Turn history plus the policy that bounds it.
pub struct ConversationSession {
    history: Vec<Turn>,
    policy: Box<dyn HistoryPolicy>,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new(Box::new(Unbounded))
    }
}

impl ConversationSession {
    /// Empty session governed by `policy`.
    pub fn new(policy: Box<dyn HistoryPolicy>) -> Self {
        tracing::debug!(policy = policy.name(), "Starting conversation session");
        Self {
            history: Vec::new(),
            policy,
        }
    }

    /// Retained turns, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Number of retained turns.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether no turns are retained.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Append a finished turn, then let the policy prune.
    pub fn record(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.history.push(Turn {
            user: user.into(),
            assistant: assistant.into(),
        });
        self.policy.apply(&mut self.history);
    }

    /// Forget every turn.
    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// Result of one conversational turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Query actually sent to the retriever.
    pub standalone_query: String,
    /// Retrieved documents, best first.
    pub documents: Vec<ScoredDocument>,
    /// Generated answer.
    pub answer: String,
}

/// Rewriter, retriever, and answer generator run in sequence per turn.
pub struct ConversationalRag {
    rewriter: QueryRewriter,
    retriever: Retriever,
    generator: AnswerGenerator,
    options: RetrievalOptions,
}

impl ConversationalRag {
    /// Pipeline retrieving with `options` for each turn.
    pub fn new(
        rewriter: QueryRewriter,
        retriever: Retriever,
        generator: AnswerGenerator,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            rewriter,
            retriever,
            generator,
            options,
        }
    }

    /// Handle one user utterance and record it in `session`.
    pub async fn ask(
        &self,
        session: &mut ConversationSession,
        utterance: &str,
    ) -> Result<TurnOutcome, ConversationError> {
        let standalone_query = self.rewriter.rewrite(utterance, session.history()).await?;
        let documents = self
            .retriever
            .retrieve(&standalone_query, &self.options)
            .await?;
        let answer = self
            .generator
            .answer(&standalone_query, &documents)
            .await
            .map_err(ConversationError::Answer)?;

        session.record(utterance, answer.clone());
        tracing::info!(
            turns = session.len(),
            documents = documents.len(),
            "Conversation turn complete"
        );
        Ok(TurnOutcome {
            standalone_query,
            documents,
            answer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClient, HashEmbeddingClient};
    use crate::llm::{ChatClient, ChatRequest, Role};
    use crate::store::{LocalVectorStore, VectorRecord, VectorStore};
    use async_trait::async_trait;
    use serde_json::Map;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct QueueChat {
        replies: Mutex<VecDeque<&'static str>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatClient for QueueChat {
        async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
            self.requests.lock().expect("lock").push(request);
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .map(str::to_string)
                .ok_or_else(|| ChatClientError::GenerationFailed("no reply queued".into()))
        }
    }

    async fn pipeline(
        dir: &std::path::Path,
        replies: Vec<&'static str>,
    ) -> (ConversationalRag, Arc<QueueChat>) {
        let embedder = Arc::new(HashEmbeddingClient::new(8));
        let store = Arc::new(LocalVectorStore::new(dir, "chat"));
        store.ensure_collection(8).await.expect("collection");
        let texts = ["Tesla makes money selling cars", "Tesla 2023 revenue was $96.8B"];
        let vectors = embedder
            .generate_embeddings(texts.iter().map(|text| text.to_string()).collect())
            .await
            .expect("vectors");
        let records = texts
            .iter()
            .zip(vectors)
            .map(|(text, vector)| VectorRecord {
                id: text.to_string(),
                text: text.to_string(),
                metadata: Map::new(),
                vector,
            })
            .collect();
        store.add(records).await.expect("add");

        let chat = Arc::new(QueueChat {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        });
        let rag = ConversationalRag::new(
            QueryRewriter::new(chat.clone()),
            Retriever::new(embedder, store),
            AnswerGenerator::new(chat.clone()),
            RetrievalOptions::similarity(2),
        );
        (rag, chat)
    }

    #[tokio::test]
    async fn first_turn_skips_rewrite_and_follow_up_uses_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (rag, chat) = pipeline(
            dir.path(),
            vec![
                "By selling cars.",
                "What was Tesla's revenue in 2023?",
                "$96.8B.",
            ],
        )
        .await;
        let mut session = ConversationSession::default();

        let first = rag
            .ask(&mut session, "How does Tesla make money?")
            .await
            .expect("first");
        assert_eq!(first.standalone_query, "How does Tesla make money?");
        assert_eq!(first.answer, "By selling cars.");
        assert_eq!(first.documents.len(), 2);

        let second = rag
            .ask(&mut session, "What about 2023 revenue?")
            .await
            .expect("second");
        assert_eq!(second.standalone_query, "What was Tesla's revenue in 2023?");
        assert_eq!(second.answer, "$96.8B.");

        assert_eq!(
            session.history(),
            &[
                Turn {
                    user: "How does Tesla make money?".into(),
                    assistant: "By selling cars.".into(),
                },
                Turn {
                    user: "What about 2023 revenue?".into(),
                    assistant: "$96.8B.".into(),
                },
            ]
        );

        let requests = chat.requests.lock().expect("lock");
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].messages[0].role, Role::System);
        assert!(requests[2].messages[1]
            .text()
            .contains("answer the Query: What was Tesla's revenue in 2023?"));
    }

    #[tokio::test]
    async fn failed_answers_leave_history_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (rag, _chat) = pipeline(dir.path(), Vec::new()).await;
        let mut session = ConversationSession::default();

        let error = rag.ask(&mut session, "Anything?").await.unwrap_err();
        assert!(matches!(error, ConversationError::Answer(_)));
        assert!(session.is_empty());
    }

    #[test]
    fn session_applies_its_policy_on_record() {
        let mut session = ConversationSession::new(Box::new(SlidingWindow::new(1)));
        session.record("one", "1");
        session.record("two", "2");
        assert_eq!(session.len(), 1);
        assert_eq!(session.history()[0].user, "two");
        session.clear();
        assert!(session.is_empty());
    }
}
