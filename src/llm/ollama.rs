//! Ollama chat over `POST {OLLAMA_URL}/api/chat`.

use super::{ChatClient, ChatClientError, ChatRequest};
use crate::http::{build_client, format_endpoint, normalize_base_url};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

/// Chat client backed by a local Ollama runtime.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaChatClient {
    /// Create a client for `model` served by the Ollama runtime at `base_url`.
    pub fn new(base_url: &str, model: &str, temperature: f32) -> Result<Self, ChatClientError> {
        let base_url = normalize_base_url(base_url).map_err(ChatClientError::Configuration)?;
        let http = build_client("chat")
            .map_err(|error| ChatClientError::Configuration(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model: model.to_string(),
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format_endpoint(&self.base_url, "api/chat")
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|message| {
                let images: Vec<&str> = message
                    .images()
                    .map(|image| image.base64.as_str())
                    .collect();
                let mut encoded = json!({
                    "role": message.role.as_str(),
                    "content": message.text(),
                });
                if !images.is_empty() {
                    encoded["images"] = json!(images);
                }
                encoded
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": request.temperature.unwrap_or(self.temperature),
            }
        });
        if let Some(schema) = &request.response_schema {
            body["format"] = schema.schema.clone();
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
        tracing::debug!(
            provider = "ollama",
            model = %self.model,
            messages = request.messages.len(),
            images = request.image_count(),
            "Requesting chat completion"
        );

        let response = self
            .http
            .post(self.endpoint())
            .json(&self.build_body(&request))
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ChatClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|error| {
            ChatClientError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(ChatClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.message.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ImageData};
    use httpmock::{Method::POST, MockServer};

    #[test]
    fn images_are_sent_in_message_images_array() {
        let client = OllamaChatClient::new("http://127.0.0.1:11434", "llava", 0.0).expect("client");
        let request = ChatRequest::new(vec![ChatMessage::user_with_images(
            "describe",
            vec![ImageData::from_base64("AAAA")],
        )])
        .with_schema("answer", json!({ "type": "object" }));
        let body = client.build_body(&request);

        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["content"], "describe");
        assert_eq!(body["messages"][0]["images"][0], "AAAA");
        assert_eq!(body["format"]["type"], "object");
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = OllamaChatClient::new(&server.base_url(), "llava", 0.0).expect("client");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "Summary text" },
                    "done": true
                }));
            })
            .await;

        let text = client
            .complete(ChatRequest::new(vec![ChatMessage::user("Summarize")]))
            .await
            .expect("completion");

        mock.assert_async().await;
        assert_eq!(text, "Summary text");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = OllamaChatClient::new(&server.base_url(), "llava", 0.0).expect("client");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(500).body("boom");
            })
            .await;

        let error = client
            .complete(ChatRequest::new(vec![ChatMessage::user("Summarize")]))
            .await
            .expect_err("error response");

        assert!(matches!(
            error,
            ChatClientError::GenerationFailed(message) if message.contains("500")
        ));
    }
}
