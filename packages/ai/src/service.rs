// ABOUTME: AI service for making structured generation calls to Anthropic Claude
// ABOUTME: Handles API requests, code-fence stripping, and JSON response parsing

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514"; // Claude Sonnet 4 (May 2025)
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Calculate appropriate max_tokens for a given model
fn get_max_tokens_for_model(model: &str) -> u32 {
    if model.contains("haiku") {
        1024
    } else {
        4096
    }
}

#[derive(Debug, Error)]
pub enum AIServiceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("No API key configured")]
    NoApiKey,

    #[error("Invalid response format")]
    InvalidResponse,
}

pub type AIServiceResult<T> = Result<T, AIServiceError>;

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug)]
pub struct AIResponse<T> {
    pub data: T,
    pub usage: Usage,
}

/// Strip markdown code fences if present (```json ... ```)
pub(crate) fn strip_code_fences(text: &str) -> &str {
    let cleaned = text.trim();
    if !cleaned.starts_with("```") {
        return cleaned;
    }
    // Skip the opening fence line, then cut at the last closing fence
    let start = cleaned.find('\n').map(|i| i + 1).unwrap_or(cleaned.len());
    let end = cleaned[start..]
        .rfind("```")
        .map(|i| i + start)
        .unwrap_or(cleaned.len());
    // A longer closing fence leaves stray backticks before the match
    cleaned[start..end].trim().trim_end_matches('`').trim()
}

/// AI service for making structured generation calls
pub struct AIService {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl AIService {
    /// Create HTTP client with timeout configuration
    fn create_client() -> AIServiceResult<Client> {
        Ok(Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?)
    }

    /// A missing key is accepted here and reported on the first call
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> AIServiceResult<Self> {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            info!("ANTHROPIC_API_KEY not set - reasoning calls will fail until it is configured");
        }

        let model = model.into();
        if model != DEFAULT_MODEL {
            info!("Using custom Anthropic model: {}", model);
        }

        Ok(Self {
            client: Self::create_client()?,
            api_key,
            model,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Get the model being used by this service
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn send(
        &self,
        prompt: String,
        system_prompt: Option<String>,
    ) -> AIServiceResult<(String, Usage)> {
        let api_key = self.api_key.as_ref().ok_or(AIServiceError::NoApiKey)?;

        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: get_max_tokens_for_model(&self.model),
            temperature: DEFAULT_TEMPERATURE,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
            system: system_prompt,
        };

        debug!(
            "Making Anthropic API request: model={}, max_tokens={}",
            request.model, request.max_tokens
        );

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("Anthropic API request timed out");
                    AIServiceError::ApiError("Request timed out".to_string())
                } else if e.is_connect() {
                    error!("Failed to connect to Anthropic API: {}", e);
                    AIServiceError::ApiError(format!("Connection failed: {}", e))
                } else {
                    error!("Anthropic API request failed: {}", e);
                    AIServiceError::RequestFailed(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Anthropic API error: {} - {}", status, error_text);
            return Err(AIServiceError::ApiError(format!(
                "API returned {}: {}",
                status, error_text
            )));
        }

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AIServiceError::ParseError(e.to_string()))?;

        // First text block; tool-use and other block types carry no text
        let text = anthropic_response
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or(AIServiceError::InvalidResponse)?;

        Ok((text, anthropic_response.usage))
    }

    /// Makes a structured generation call to Claude
    /// The prompt should request JSON output and the response will be parsed
    pub async fn generate_structured<T: for<'de> Deserialize<'de>>(
        &self,
        prompt: String,
        system_prompt: Option<String>,
    ) -> AIServiceResult<AIResponse<T>> {
        let (text, usage) = self.send(prompt, system_prompt).await?;
        let json_text = strip_code_fences(&text);

        let data: T = serde_json::from_str(json_text).map_err(|e| {
            error!(
                "JSON parsing failed: {}. JSON snippet: {}",
                e,
                json_text.chars().take(500).collect::<String>()
            );
            AIServiceError::ParseError(format!("Failed to parse JSON: {}", e))
        })?;

        Ok(AIResponse { data, usage })
    }
}
