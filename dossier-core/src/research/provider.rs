//! Search providers.
//!
//! `SearchProvider` is the seam between the research engine and the outside
//! world. The default implementation queries the DuckDuckGo instant-answer
//! API (no API key required). `StaticProvider` serves scripted results for
//! tests and offline runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::ResearchConfig;
use crate::error::ResearchError;

/// A single raw search hit, before deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Snippet or description text; may be empty.
    pub snippet: String,
    /// Result URL; may be empty for instant answers without attribution.
    pub url: String,
    /// The query that surfaced this result.
    pub source_query: String,
}

/// Issues web searches on behalf of the research engine.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one search query and return its extracted results.
    ///
    /// Implementations must tolerate individual malformed results (skip
    /// them, never fail the whole query over one bad entry).
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ResearchError>;
}

/// Searches the web via the DuckDuckGo instant-answer API.
pub struct DuckDuckGoProvider {
    client: reqwest::Client,
    max_results_per_query: usize,
}

impl DuckDuckGoProvider {
    /// Build a provider from the research configuration.
    pub fn new(config: &ResearchConfig) -> Result<Self, ResearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.search_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ResearchError::SearchFailed {
                query: String::new(),
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_results_per_query: config.max_results,
        })
    }

    fn extract_results(&self, query: &str, body: &serde_json::Value) -> Vec<SearchResult> {
        let mut results = Vec::new();

        // Main abstract, when present.
        if let Some(text) = body.get("AbstractText").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                let title = body
                    .get("Heading")
                    .and_then(|v| v.as_str())
                    .unwrap_or(query);
                let url = body
                    .get("AbstractURL")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                results.push(SearchResult {
                    title: title.to_string(),
                    snippet: text.to_string(),
                    url: url.to_string(),
                    source_query: query.to_string(),
                });
            }
        }

        // Related topics carry `Text` and `FirstURL`; topic groups nest
        // their entries under `Topics`.
        let mut topics: Vec<&serde_json::Value> = Vec::new();
        if let Some(related) = body.get("RelatedTopics").and_then(|v| v.as_array()) {
            for entry in related {
                if let Some(nested) = entry.get("Topics").and_then(|v| v.as_array()) {
                    topics.extend(nested.iter());
                } else {
                    topics.push(entry);
                }
            }
        }
        if let Some(direct) = body.get("Results").and_then(|v| v.as_array()) {
            topics.extend(direct.iter());
        }

        for topic in topics {
            if results.len() >= self.max_results_per_query {
                break;
            }
            // A topic without text is malformed; skip it rather than
            // failing the query.
            let Some(text) = topic.get("Text").and_then(|v| v.as_str()) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            let url = topic
                .get("FirstURL")
                .and_then(|v| v.as_str())
                .unwrap_or("");

            // DuckDuckGo topics pack "Title - description" into Text.
            let (title, snippet) = match text.split_once(" - ") {
                Some((t, s)) => (t.trim(), s.trim()),
                None => (text, ""),
            };

            results.push(SearchResult {
                title: title.to_string(),
                snippet: snippet.to_string(),
                url: url.to_string(),
                source_query: query.to_string(),
            });
        }

        results.truncate(self.max_results_per_query);
        results
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ResearchError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );

        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| ResearchError::SearchFailed {
                    query: query.to_string(),
                    message: format!("Search request failed: {e}"),
                })?;

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ResearchError::ResponseParse {
                    message: format!("query '{query}': {e}"),
                })?;

        Ok(self.extract_results(query, &body))
    }
}

/// A scripted provider: maps query strings to canned results.
///
/// Queries with no script entry return the fallback; queries scripted as
/// `Err` fail with `SearchFailed`. Records every query it receives.
pub struct StaticProvider {
    scripts: HashMap<String, Result<Vec<SearchResult>, String>>,
    fallback: Vec<SearchResult>,
    fail_all: bool,
    calls: Mutex<Vec<String>>,
}

impl StaticProvider {
    /// Provider that answers every query with the same result list.
    pub fn answering_all(fallback: Vec<SearchResult>) -> Self {
        Self {
            scripts: HashMap::new(),
            fallback,
            fail_all: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Provider that fails every query.
    pub fn unreachable() -> Self {
        let mut provider = Self::answering_all(Vec::new());
        provider.fail_all = true;
        provider
    }

    /// Script a specific query.
    pub fn script(&mut self, query: &str, result: Result<Vec<SearchResult>, String>) {
        self.scripts.insert(query.to_lowercase(), result);
    }

    /// Queries received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for StaticProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ResearchError> {
        self.calls.lock().unwrap().push(query.to_string());

        if self.fail_all {
            return Err(ResearchError::SearchFailed {
                query: query.to_string(),
                message: "provider unreachable".into(),
            });
        }

        match self.scripts.get(&query.to_lowercase()) {
            Some(Ok(results)) => Ok(results
                .iter()
                .map(|r| SearchResult {
                    source_query: query.to_string(),
                    ..r.clone()
                })
                .collect()),
            Some(Err(message)) => Err(ResearchError::SearchFailed {
                query: query.to_string(),
                message: message.clone(),
            }),
            None => Ok(self
                .fallback
                .iter()
                .map(|r| SearchResult {
                    source_query: query.to_string(),
                    ..r.clone()
                })
                .collect()),
        }
    }
}
