//! Ollama embeddings over `POST {OLLAMA_URL}/api/embed`.

use super::{EmbeddingClient, EmbeddingClientError, validate_vectors};
use crate::http::{build_client, format_endpoint, normalize_base_url};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl OllamaEmbeddingClient {
    /// Create a client for `model` served by the Ollama runtime at `base_url`.
    pub fn new(
        base_url: &str,
        model: &str,
        dimension: usize,
        batch_size: usize,
    ) -> Result<Self, EmbeddingClientError> {
        let base_url = normalize_base_url(base_url).map_err(EmbeddingClientError::Configuration)?;
        let http = build_client("embeddings")
            .map_err(|error| EmbeddingClientError::Configuration(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model: model.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }

    fn endpoint(&self) -> String {
        format_endpoint(&self.base_url, "api/embed")
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            tracing::debug!(
                provider = "ollama",
                model = %self.model,
                batch = batch.len(),
                "Generating embeddings"
            );
            let response = self
                .http
                .post(self.endpoint())
                .json(&json!({ "model": self.model, "input": batch }))
                .send()
                .await
                .map_err(|error| {
                    EmbeddingClientError::GenerationFailed(format!(
                        "failed to reach Ollama at {}: {error}",
                        self.base_url
                    ))
                })?;

            if response.status() == StatusCode::NOT_FOUND {
                return Err(EmbeddingClientError::GenerationFailed(format!(
                    "Ollama model '{}' not found",
                    self.model
                )));
            }
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(EmbeddingClientError::GenerationFailed(format!(
                    "Ollama returned {status}: {body}"
                )));
            }

            let body: EmbedResponse = response.json().await.map_err(|error| {
                EmbeddingClientError::InvalidResponse(format!(
                    "failed to decode Ollama response: {error}"
                ))
            })?;
            vectors.extend(body.embeddings);
        }

        validate_vectors(&vectors, texts.len(), self.dimension)?;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
