use super::models::SamplingConfig;
use crate::config::Config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// One prompt for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub sampling: SamplingConfig,
}

/// What came back. `text` is `None` when the API answered without any
/// candidate text (blocked, truncated to nothing, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResponse {
    pub text: Option<String>,
}

impl GenerationResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn empty() -> Self {
        Self { text: None }
    }
}

/// Transport-level failures. Retried by the caller exactly like an empty answer.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Status(String),

    #[error("failed to parse generation response: {message}")]
    Decode { message: String },

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Narrow seam over the text-generation API so fakes can stand in for it.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ClientError>;
}

/// Google Generative Language API (`generateContent`).
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: Url,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> Result<Url, ClientError> {
        let model = model.trim_start_matches('/');
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        Ok(self
            .api_base
            .join(&format!("v1beta/{}:generateContent", model))?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationParams,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f64,
    top_p: f64,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ClientError> {
        let url = self.endpoint(&request.model)?;
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationParams {
                temperature: request.sampling.temperature,
                top_p: request.sampling.top_p,
                top_k: request.sampling.top_k,
                max_output_tokens: request.sampling.max_output_tokens,
            },
        };

        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = match status.as_u16() {
                401 | 403 => format!(
                    "API rejected the credential ({}). Check GOOGLE_API_KEY / GEMINI_API_KEY.",
                    status
                ),
                429 => "Rate limited by the generation API.".to_string(),
                500..=599 => format!(
                    "Generation API server error ({}). The service may be temporarily unavailable.",
                    status
                ),
                _ => format!("API error {}: {}", status, truncate_str(&text, 200)),
            };
            return Err(ClientError::Status(message));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| ClientError::Decode {
                message: format!("{} ({})", e, truncate_str(&text, 200)),
            })?;

        Ok(GenerationResponse {
            text: extract_text(parsed),
        })
    }
}

/// Truncate a string for display (Unicode-safe)
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        s
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..byte_idx]
    }
}
