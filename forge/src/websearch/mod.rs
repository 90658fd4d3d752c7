//! Web search provider contract.
//!
//! A blocking call (bounded by a total timeout) returning title/url/snippet
//! triples. [`HttpWebSearch`] talks to a SearXNG-compatible JSON endpoint;
//! [`MockWebSearch`] serves tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CoreError;

#[derive(Clone, Debug, Deserialize)]
pub struct SearchResult {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, alias = "content")]
    pub snippet: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, CoreError>;
}

/// SearXNG-compatible search over HTTP (`GET /search?q=...&format=json`).
pub struct HttpWebSearch {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

impl HttpWebSearch {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl WebSearch for HttpWebSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, CoreError> {
        let response = self
            .client
            .get(format!("{}/search", self.endpoint))
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("web search: {}", e)))?
            .error_for_status()
            .map_err(|e| CoreError::UpstreamUnavailable(format!("web search: {}", e)))?;
        let decoded: SearchResponse = response
            .json()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("web search decode: {}", e)))?;
        Ok(decoded.results.into_iter().take(max_results).collect())
    }
}

/// Canned results for tests; records queries.
pub struct MockWebSearch {
    results: Vec<SearchResult>,
    queries: std::sync::Mutex<Vec<String>>,
}

impl MockWebSearch {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            queries: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl WebSearch for MockWebSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, CoreError> {
        self.queries
            .lock()
            .expect("mock lock poisoned")
            .push(query.to_string());
        Ok(self.results.iter().take(max_results).cloned().collect())
    }
}

/// Renders search results as a numbered context block.
pub fn format_results(results: &[SearchResult]) -> String {
    let mut parts = Vec::new();
    for (i, result) in results.iter().enumerate() {
        let title = result.title.trim();
        if title.is_empty() {
            continue;
        }
        parts.push(format!("{}. {}", i + 1, title));
        if !result.url.trim().is_empty() {
            parts.push(format!("   URL: {}", result.url.trim()));
        }
        if !result.snippet.trim().is_empty() {
            parts.push(format!("   {}", result.snippet.trim()));
        }
        parts.push(String::new());
    }
    parts.join("\n").trim().to_string()
}
