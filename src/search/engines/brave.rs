use super::{EngineError, SearchEngine};
use crate::types::SearchResult;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Brave Search API adapter. Optional; requires a subscription token in
/// `BRAVE_API_KEY` (free tier works).
pub struct BraveEngine {
    client: reqwest::Client,
    subscription_token: String,
}

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWebSection>,
}

#[derive(Deserialize)]
struct BraveWebSection {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Deserialize)]
struct BraveItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    age: Option<String>,
}

impl BraveEngine {
    pub fn new(client: reqwest::Client, subscription_token: String) -> Self {
        Self {
            client,
            subscription_token,
        }
    }
}

#[async_trait]
impl SearchEngine for BraveEngine {
    fn name(&self) -> &'static str {
        "brave"
    }

    async fn search(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError> {
        let count = max_results.min(20).to_string();
        let resp = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("Accept", "application/json")
            .header("Accept-Encoding", "gzip")
            .header("X-Subscription-Token", &self.subscription_token)
            .timeout(Duration::from_secs(10))
            .query(&[
                ("q", keyword),
                ("count", count.as_str()),
                ("offset", "0"),
                ("safesearch", "moderate"),
            ])
            .send()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::from_status(resp.status(), "brave"));
        }

        let data: BraveResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transient(format!("brave decode: {}", e)))?;

        let items = data.web.map(|w| w.results).unwrap_or_default();
        Ok(items
            .into_iter()
            .filter(|item| !item.url.trim().is_empty())
            .map(|item| SearchResult {
                title: item.title,
                href: item.url,
                body: item.description,
                source: "brave".to_string(),
                published: item.age.filter(|a| !a.trim().is_empty()),
            })
            .collect())
    }
}
