use super::{EngineError, SearchEngine};
use crate::types::SearchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tavily HTTP API adapter. Keyed by `TAVILY_API_KEY`; tried first when
/// configured since it is the most reliable back-end in the chain.
pub struct TavilyEngine {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyItem>,
}

#[derive(Deserialize)]
struct TavilyItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    published_date: Option<String>,
}

impl TavilyEngine {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchEngine for TavilyEngine {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query: keyword,
            search_depth: "basic",
            max_results: max_results.min(20),
        };

        let resp = self
            .client
            .post("https://api.tavily.com/search")
            .timeout(Duration::from_secs(15))
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::from_status(resp.status(), "tavily"));
        }

        let data: TavilyResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transient(format!("tavily decode: {}", e)))?;

        Ok(data
            .results
            .into_iter()
            .filter(|item| !item.url.trim().is_empty())
            .take(max_results)
            .map(|item| SearchResult {
                title: item.title,
                href: item.url,
                body: item.content,
                source: "tavily".to_string(),
                published: item.published_date.filter(|p| !p.trim().is_empty()),
            })
            .collect())
    }
}
