//! OpenAI chat completions, including image parts and JSON-schema responses.

use super::{ChatClient, ChatClientError, ChatMessage, ChatRequest, ContentPart};
use crate::http::{build_client, format_endpoint, normalize_base_url};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Chat client backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChatClient {
    /// Create a client for `model` against `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        temperature: f32,
    ) -> Result<Self, ChatClientError> {
        if api_key.trim().is_empty() {
            return Err(ChatClientError::Configuration(
                "API key must not be empty".into(),
            ));
        }
        let base_url = normalize_base_url(base_url).map_err(ChatClientError::Configuration)?;
        let http = build_client("chat")
            .map_err(|error| ChatClientError::Configuration(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model: model.to_string(),
            temperature,
        })
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(encode_message).collect();
        let mut body = Map::new();
        body.insert("model".into(), Value::String(self.model.clone()));
        body.insert("messages".into(), Value::Array(messages));
        body.insert(
            "temperature".into(),
            json!(request.temperature.unwrap_or(self.temperature)),
        );
        if let Some(schema) = &request.response_schema {
            body.insert(
                "response_format".into(),
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": schema.name,
                        "schema": schema.schema,
                        "strict": true,
                    }
                }),
            );
        }
        Value::Object(body)
    }
}

/// Text-only messages use the plain string form; anything with images uses content parts.
fn encode_message(message: &ChatMessage) -> Value {
    let has_images = message.images().next().is_some();
    if !has_images {
        return json!({ "role": message.role.as_str(), "content": message.text() });
    }

    let parts: Vec<Value> = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "type": "text", "text": text }),
            ContentPart::Image(image) => json!({
                "type": "image_url",
                "image_url": { "url": image.data_url() }
            }),
        })
        .collect();
    json!({ "role": message.role.as_str(), "content": parts })
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
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
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
        tracing::debug!(
            provider = "openai",
            model = %self.model,
            messages = request.messages.len(),
            images = request.image_count(),
            structured = request.response_schema.is_some(),
            "Requesting chat completion"
        );

        let response = self
            .http
            .post(format_endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&self.build_body(&request))
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            return Err(ChatClientError::GenerationFailed(format!(
                "OpenAI returned {status}: {detail}"
            )));
        }

        let body: CompletionResponse = response.json().await.map_err(|error| {
            ChatClientError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;
        let message = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ChatClientError::InvalidResponse("completion had no choices".into()))?;

        if let Some(refusal) = message.refusal.filter(|text| !text.trim().is_empty()) {
            return Err(ChatClientError::GenerationFailed(format!(
                "model refused: {refusal}"
            )));
        }

        message
            .content
            .map(|text| text.trim().to_string())
            .ok_or_else(|| ChatClientError::InvalidResponse("completion had no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageData;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer) -> OpenAiChatClient {
        OpenAiChatClient::new(&server.base_url(), "sk-test".into(), "gpt-4o", 0.0).expect("client")
    }

    #[test]
    fn text_messages_use_plain_content() {
        let encoded = encode_message(&ChatMessage::system("be brief"));
        assert_eq!(encoded, json!({ "role": "system", "content": "be brief" }));
    }

    #[test]
    fn image_messages_use_content_parts() {
        let image = ImageData {
            base64: "AAAA".into(),
            mime_type: "image/jpeg".into(),
        };
        let encoded = encode_message(&ChatMessage::user_with_images("what is this", vec![image]));
        assert_eq!(encoded["content"][0]["type"], "text");
        assert_eq!(encoded["content"][1]["type"], "image_url");
        assert_eq!(
            encoded["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
    }

    #[test]
    fn schema_requests_strict_json_output() {
        let server_url = "http://localhost:1";
        let client =
            OpenAiChatClient::new(server_url, "sk".into(), "gpt-4o", 0.2).expect("client");
        let request = ChatRequest::new(vec![ChatMessage::user("q")])
            .with_schema("query_variations", json!({ "type": "object" }));
        let body = client.build_body(&request);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "query_variations");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert!((body["temperature"].as_f64().expect("temperature") - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn completion_returns_trimmed_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body_contains("\"model\":\"gpt-4o\"");
                then.status(200).json_body(json!({
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": "  Answer text \n" } }
                    ]
                }));
            })
            .await;

        let text = client(&server)
            .complete(ChatRequest::new(vec![ChatMessage::user("question")]))
            .await
            .expect("completion");

        mock.assert_async().await;
        assert_eq!(text, "Answer text");
    }

    #[tokio::test]
    async fn error_status_is_generation_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let error = client(&server)
            .complete(ChatRequest::new(vec![ChatMessage::user("question")]))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            ChatClientError::GenerationFailed(message) if message.contains("500")
        ));
    }

    #[tokio::test]
    async fn empty_choices_are_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client(&server)
            .complete(ChatRequest::new(vec![ChatMessage::user("question")]))
            .await
            .unwrap_err();
        assert!(matches!(error, ChatClientError::InvalidResponse(_)));
    }
}
