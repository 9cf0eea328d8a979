use super::{RetrievalError, RetrievalOptions, Retriever};
use crate::llm::{ChatClient, ChatMessage, ChatRequest};
use crate::store::ScoredDocument;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const VARIATIONS_SCHEMA_NAME: &str = "query_variations";

/// Documents retrieved for one query variation.
#[derive(Debug, Clone)]
pub struct MultiQueryResult {
    /// Variation text sent to the retriever.
    pub query: String,
    /// Documents for that variation, best first.
    pub documents: Vec<ScoredDocument>,
}

#[derive(Deserialize)]
struct QueryVariations {
    queries: Vec<String>,
}

/// Rephrases a query several ways and retrieves for each phrasing.
pub struct MultiQueryRetriever {
    chat: Arc<dyn ChatClient>,
    retriever: Retriever,
}

impl MultiQueryRetriever {
    /// Multi-query retriever generating variations with `chat`.
    pub fn new(chat: Arc<dyn ChatClient>, retriever: Retriever) -> Self {
        Self { chat, retriever }
    }

    /// Ask the model for `count` alternative phrasings of `query`.
    pub async fn generate_variations(
        &self,
        query: &str,
        count: usize,
    ) -> Result<Vec<String>, RetrievalError> {
        if count == 0 {
            return Err(RetrievalError::InvalidParameter(
                "variation count must be greater than zero".into(),
            ));
        }

        let prompt = format!(
            "Generate {count} different variations of this query that would help retrieve \
             relevant documents:\n\n\
             Original query: {query}\n\n\
             Return {count} alternative queries that rephrase or approach the same question \
             from different angles."
        );
        let mut request = ChatRequest::new(vec![ChatMessage::user(prompt)])
            .with_schema(VARIATIONS_SCHEMA_NAME, variations_schema());
        request.temperature = Some(0.0);

        let raw = self.chat.complete(request).await?;
        let variations = parse_variations(&raw)?;
        tracing::info!(
            requested = count,
            generated = variations.len(),
            "Generated query variations"
        );
        Ok(variations)
    }

    /// Retrieve separately for each variation, keeping variation order.
    pub async fn retrieve_all(
        &self,
        variations: &[String],
        options: &RetrievalOptions,
    ) -> Result<Vec<MultiQueryResult>, RetrievalError> {
        let mut results = Vec::with_capacity(variations.len());
        for query in variations {
            let documents = self.retriever.retrieve(query, options).await?;
            results.push(MultiQueryResult {
                query: query.clone(),
                documents,
            });
        }
        Ok(results)
    }

    /// Generate variations for `query` and retrieve for each of them.
    pub async fn retrieve(
        &self,
        query: &str,
        count: usize,
        options: &RetrievalOptions,
    ) -> Result<Vec<MultiQueryResult>, RetrievalError> {
        let variations = self.generate_variations(query, count).await?;
        self.retrieve_all(&variations, options).await
    }
}

fn variations_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "queries": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["queries"],
        "additionalProperties": false
    })
}

fn parse_variations(raw: &str) -> Result<Vec<String>, RetrievalError> {
    let parsed: QueryVariations = serde_json::from_str(raw.trim())
        .map_err(|error| RetrievalError::MalformedVariations(error.to_string()))?;
    let queries: Vec<String> = parsed
        .queries
        .into_iter()
        .map(|query| query.trim().to_string())
        .filter(|query| !query.is_empty())
        .collect();
    if queries.is_empty() {
        return Err(RetrievalError::MalformedVariations(
            "response contained no queries".into(),
        ));
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClient, HashEmbeddingClient};
    use crate::llm::ChatClientError;
    use crate::store::{LocalVectorStore, VectorRecord, VectorStore};
    use async_trait::async_trait;
    use serde_json::Map;
    use std::sync::Mutex;

    struct ScriptedChat {
        reply: String,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
            self.requests.lock().expect("lock").push(request);
            Ok(self.reply.clone())
        }
    }

    fn scripted(reply: &str) -> Arc<ScriptedChat> {
        Arc::new(ScriptedChat {
            reply: reply.into(),
            requests: Mutex::new(Vec::new()),
        })
    }

    async fn retriever(dir: &std::path::Path) -> Retriever {
        let embedder = Arc::new(HashEmbeddingClient::new(8));
        let store = Arc::new(LocalVectorStore::new(dir, "mq"));
        store.ensure_collection(8).await.expect("collection");
        let texts = ["Tesla sells cars", "Tesla sells energy storage", "Ford trucks"];
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
        Retriever::new(embedder, store)
    }

    #[tokio::test]
    async fn variations_use_structured_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chat =
            scripted(r#"{"queries": ["Tesla revenue sources", " Tesla business model ", ""]}"#);
        let multi = MultiQueryRetriever::new(chat.clone(), retriever(dir.path()).await);

        let variations = multi
            .generate_variations("How does Tesla make money?", 3)
            .await
            .expect("variations");
        assert_eq!(variations, vec!["Tesla revenue sources", "Tesla business model"]);

        let requests = chat.requests.lock().expect("lock");
        let request = &requests[0];
        let schema = request.response_schema.as_ref().expect("schema");
        assert_eq!(schema.name, "query_variations");
        assert_eq!(schema.schema["required"][0], "queries");
        assert!(request.messages[0].text().contains("Original query: How does Tesla make money?"));
        assert!(request.messages[0].text().starts_with("Generate 3 different variations"));
    }

    #[tokio::test]
    async fn missing_queries_field_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let multi = MultiQueryRetriever::new(
            scripted(r#"{"alternatives": ["x"]}"#),
            retriever(dir.path()).await,
        );
        let error = multi.generate_variations("q", 3).await.unwrap_err();
        assert!(matches!(error, RetrievalError::MalformedVariations(_)));
    }

    #[tokio::test]
    async fn results_follow_variation_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let multi = MultiQueryRetriever::new(
            scripted(r#"{"queries": ["Ford trucks", "Tesla sells cars"]}"#),
            retriever(dir.path()).await,
        );

        let results = multi
            .retrieve("vehicles", 2, &RetrievalOptions::similarity(1))
            .await
            .expect("results");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].query, "Ford trucks");
        assert_eq!(results[0].documents[0].text, "Ford trucks");
        assert_eq!(results[1].documents[0].text, "Tesla sells cars");
    }
}
