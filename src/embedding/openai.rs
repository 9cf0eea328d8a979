//! OpenAI embeddings over `POST {base}/embeddings`.

use super::{EmbeddingClient, EmbeddingClientError, validate_vectors};
use crate::http::{build_client, format_endpoint, normalize_base_url};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Embedding client backed by an OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl OpenAiEmbeddingClient {
    /// Create a client for `model` against `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        dimension: usize,
        batch_size: usize,
    ) -> Result<Self, EmbeddingClientError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingClientError::Configuration(
                "API key must not be empty".into(),
            ));
        }
        let base_url = normalize_base_url(base_url).map_err(EmbeddingClientError::Configuration)?;
        let http = build_client("embeddings")
            .map_err(|error| EmbeddingClientError::Configuration(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model: model.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: batch,
        };

        let response = self
            .http
            .post(format_endpoint(&self.base_url, "embeddings"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::GenerationFailed(format!("request failed: {error}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            tracing::error!(provider = "openai", %status, "Embedding request rejected");
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "OpenAI returned {status}: {detail}"
            )));
        }

        let mut body: EmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;
        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
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
                provider = "openai",
                model = %self.model,
                batch = batch.len(),
                "Generating embeddings"
            );
            vectors.extend(self.embed_batch(batch).await?);
        }

        validate_vectors(&vectors, texts.len(), self.dimension)?;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
