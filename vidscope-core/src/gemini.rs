//! Generative model client: text and multimodal completion via the Gemini
//! `generateContent` REST API.
//!
//! Every call is single-shot: no retries and no backoff. Callers that want
//! partial-success semantics (the analysis orchestrator) catch errors per call.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_KEY_HEADER: &str = "x-goog-api-key";

// ============================================================================
// GenerativeBackend trait
// ============================================================================

/// One piece of a prompt: text or inline binary media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Inline { mime_type: String, data: Vec<u8> },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn inline(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Part::Inline {
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// Abstraction over prompt → text completion providers.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Send one prompt made of `parts` and return the concatenated text reply.
    async fn generate(&self, parts: Vec<Part>) -> Result<String, GenerationError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Response contained no text candidates")]
    EmptyResponse,

    #[error("Prompt was blocked: {0}")]
    Blocked(String),

    #[error("Missing API key")]
    MissingApiKey,
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Falls back to `GEMINI_API_KEY`, then `GOOGLE_API_KEY`, when `api_key` is `None`.
    pub fn new(api_key: Option<String>, settings: &crate::config::GeminiSettings) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(settings.request_timeout_seconds),
        }
    }
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl From<Part> for WirePart {
    fn from(part: Part) -> Self {
        match part {
            Part::Text(text) => WirePart::Text { text },
            Part::Inline { mime_type, data } => WirePart::Inline {
                inline_data: InlineData {
                    mime_type,
                    data: STANDARD.encode(data),
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    async fn generate_once(&self, parts: Vec<Part>) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: parts.into_iter().map(WirePart::from).collect(),
            }],
        };

        // Key in a header only; error values carry no URL.
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.without_url()))?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");
            return Err(GenerationError::Api { code, message });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Http(e.without_url()))?;

        if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(GenerationError::Blocked(reason));
        }

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(text)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, GenerationError> {
        self.generate_once(parts).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// TESTS
// ============================================================================
