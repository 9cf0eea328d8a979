//! Language-model call contract shared by the summarizer, rewriter, and answerers.
//!
//! A request is an ordered list of role-tagged messages whose content is a mix of text and
//! inline images, plus an optional JSON schema the response must follow. Providers translate
//! this into their own wire format and return the assistant text.

use crate::config::{ChatProvider, Config};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

mod ollama;
mod openai;

pub use ollama::OllamaChatClient;
pub use openai::OpenAiChatClient;

/// Errors surfaced while calling a chat provider.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Client could not be constructed from the supplied settings.
    #[error("Chat client misconfigured: {0}")]
    Configuration(String),
    /// Provider was unreachable.
    #[error("Chat provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed or lacked the expected fields.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Instructions framing the conversation.
    System,
    /// End-user content.
    User,
    /// Earlier model output.
    Assistant,
}

impl Role {
    /// Wire name shared by OpenAI and Ollama.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Base64 image payload attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Standard base64 without a data-URL prefix.
    pub base64: String,
    /// MIME type such as `image/png`.
    pub mime_type: String,
}

impl ImageData {
    /// Wrap a payload, sniffing the MIME type from its leading bytes.
    pub fn from_base64(base64: impl Into<String>) -> Self {
        let base64 = base64.into();
        let mime_type = sniff_image_mime_type(&base64).to_string();
        Self { base64, mime_type }
    }

    /// `data:` URL form used by OpenAI image parts.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    /// Plain text.
    Text(String),
    /// Inline image.
    Image(ImageData),
}

/// Role-tagged message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Message author.
    pub role: Role,
    /// Ordered content parts.
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// System instruction.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::Text(text.into())],
        }
    }

    /// Text-only user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::Text(text.into())],
        }
    }

    /// Earlier assistant reply.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::Text(text.into())],
        }
    }

    /// User message with text followed by inline images.
    pub fn user_with_images(text: impl Into<String>, images: Vec<ImageData>) -> Self {
        let mut content = Vec::with_capacity(images.len() + 1);
        content.push(ContentPart::Text(text.into()));
        content.extend(images.into_iter().map(ContentPart::Image));
        Self {
            role: Role::User,
            content,
        }
    }

    /// Concatenated text parts, separated by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Image parts in order.
    pub fn images(&self) -> impl Iterator<Item = &ImageData> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::Image(image) => Some(image),
            ContentPart::Text(_) => None,
        })
    }
}

/// Named JSON schema the response must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    /// Schema identifier sent to providers that require one.
    pub name: String,
    /// JSON Schema document.
    pub schema: Value,
}

/// Complete request handed to a [`ChatClient`].
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Ordered conversation.
    pub messages: Vec<ChatMessage>,
    /// Overrides the client's default temperature.
    pub temperature: Option<f32>,
    /// Requests structured JSON output.
    pub response_schema: Option<ResponseSchema>,
}

impl ChatRequest {
    /// Request built from `messages` with client defaults.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Require the response to follow `schema`.
    pub fn with_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.response_schema = Some(ResponseSchema {
            name: name.into(),
            schema,
        });
        self
    }

    /// Number of image parts across all messages.
    pub fn image_count(&self) -> usize {
        self.messages.iter().map(|message| message.images().count()).sum()
    }
}

/// Interface implemented by chat providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run one completion and return the assistant text.
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError>;
}

/// Guess an image MIME type from the first decoded bytes, defaulting to JPEG.
pub fn sniff_image_mime_type(base64: &str) -> &'static str {
    let prefix: String = base64
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(16)
        .collect();
    let Ok(bytes) = STANDARD.decode(prefix.as_bytes()) else {
        return "image/jpeg";
    };

    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Build a chat client suitable for the current configuration.
pub fn get_chat_client(config: &Config) -> Result<Arc<dyn ChatClient>, ChatClientError> {
    tracing::debug!(
        provider = ?config.chat_provider,
        model = %config.chat_model,
        "Initializing chat client"
    );
    let client: Arc<dyn ChatClient> = match config.chat_provider {
        ChatProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                ChatClientError::Configuration("OPENAI_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiChatClient::new(
                &config.openai_base_url,
                api_key,
                &config.chat_model,
                config.chat_temperature,
            )?)
        }
        ChatProvider::Ollama => Arc::new(OllamaChatClient::new(
            &config.ollama_url,
            &config.chat_model,
            config.chat_temperature,
        )?),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_image_signatures() {
        let png = STANDARD.encode([0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0]);
        let gif = STANDARD.encode(b"GIF89a\x01\x00\x01\x00\x00\x00");
        let webp = STANDARD.encode(b"RIFF\x00\x00\x00\x00WEBPVP8 ");
        let jpeg = STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0, 1]);

        assert_eq!(sniff_image_mime_type(&png), "image/png");
        assert_eq!(sniff_image_mime_type(&gif), "image/gif");
        assert_eq!(sniff_image_mime_type(&webp), "image/webp");
        assert_eq!(sniff_image_mime_type(&jpeg), "image/jpeg");
        assert_eq!(sniff_image_mime_type("%%%not-base64"), "image/jpeg");
    }

    #[test]
    fn data_url_embeds_mime_and_payload() {
        let image = ImageData {
            base64: "AAAA".into(),
            mime_type: "image/png".into(),
        };
        assert_eq!(image.data_url(), "data:image/png;base64,AAAA");
    }

    #[test]
    fn message_helpers_split_text_and_images() {
        let message = ChatMessage::user_with_images(
            "describe",
            vec![ImageData::from_base64("AAAA"), ImageData::from_base64("BBBB")],
        );
        assert_eq!(message.role, Role::User);
        assert_eq!(message.text(), "describe");
        assert_eq!(message.images().count(), 2);

        let request = ChatRequest::new(vec![ChatMessage::system("sys"), message]);
        assert_eq!(request.image_count(), 2);
    }
}
