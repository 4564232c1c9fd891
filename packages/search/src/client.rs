// ABOUTME: Brave web search client that flattens results into a plain text block
// ABOUTME: A missing API key is reported when a search is attempted, not at construction

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

const DEFAULT_RESULT_COUNT: u8 = 5;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("SEARCH_API_KEY is not configured")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Search API returned {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Failed to parse search response: {0}")]
    ParseError(String),
}

impl SearchError {
    pub fn is_retriable(&self) -> bool {
        !matches!(self, SearchError::MissingApiKey)
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// One outbound search call
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Debug, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Debug, Deserialize)]
struct WebResult {
    title: String,
    url: String,
    #[serde(default)]
    description: Option<String>,
}

pub struct BraveSearchClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    result_count: u8,
}

impl BraveSearchClient {
    pub fn new(
        api_key: Option<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            result_count: DEFAULT_RESULT_COUNT,
        })
    }

    pub fn with_result_count(mut self, count: u8) -> Self {
        self.result_count = count.max(1);
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// One `title\nurl\ndescription` paragraph per result
fn flatten(results: &[WebResult]) -> String {
    results
        .iter()
        .map(|r| match r.description.as_deref() {
            Some(desc) if !desc.is_empty() => format!("{}\n{}\n{}", r.title, r.url, desc),
            _ => format!("{}\n{}", r.title, r.url),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl SearchBackend for BraveSearchClient {
    async fn search(&self, query: &str) -> Result<String> {
        let api_key = self.api_key.as_ref().ok_or(SearchError::MissingApiKey)?;

        debug!("Searching: {}", query);

        let count = self.result_count.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())])
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Search API error: {} - {}", status, body);
            return Err(SearchError::ApiError { status, body });
        }

        let parsed: BraveResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        let results = parsed.web.map(|w| w.results).unwrap_or_default();
        debug!("Search for {:?} returned {} results", query, results.len());
        Ok(flatten(&results))
    }
}
