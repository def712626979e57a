//! Client for the external vision-description model.
//!
//! Speaks the OpenAI chat-completions protocol: one user message holding the
//! prompt text and the image as an inline base64 data URL.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::normalize::NormalizedImage;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    /// `None` keeps the transport default.
    pub timeout_secs: Option<u64>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("request to vision API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("vision API rejected the credentials: {0}")]
    Authentication(String),
    #[error("vision API rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("vision API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed vision API response: {0}")]
    Malformed(String),
}

/// Produces a textual description for an image.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn describe(&self, prompt: &str, image: &NormalizedImage) -> Result<String, VisionError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

pub fn data_url(image: &NormalizedImage) -> String {
    format!(
        "data:{};base64,{}",
        image.media_type,
        general_purpose::STANDARD.encode(&image.bytes)
    )
}

pub struct OpenAiVisionClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiVisionClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, VisionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl VisionClient for OpenAiVisionClient {
    async fn describe(&self, prompt: &str, image: &NormalizedImage) -> Result<String, VisionError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let payload = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(image),
                        },
                    },
                ],
            }],
            max_tokens: self.config.max_tokens,
        };

        tracing::debug!(
            model = %self.config.model,
            image_bytes = image.bytes.len(),
            media_type = %image.media_type,
            "sending description request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = body.chars().take(500).collect::<String>();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    VisionError::Authentication(detail)
                }
                StatusCode::TOO_MANY_REQUESTS => VisionError::RateLimited(detail),
                _ => VisionError::Status {
                    status,
                    body: detail,
                },
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| VisionError::Malformed(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| VisionError::Malformed("no choices in response".to_string()))?
            .message
            .content
            .ok_or_else(|| VisionError::Malformed("first choice has no content".to_string()))?;

        tracing::debug!(chars = text.chars().count(), "description received");

        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
