pub mod brave;
pub mod duckduckgo;
pub mod searxng;
pub mod tavily;
pub mod wikipedia;

use crate::types::SearchResult;
use async_trait::async_trait;
use reqwest::StatusCode;

/// Failure classification at the engine seam. The manager treats every
/// variant as "this engine produced nothing".
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transient: {0}")]
    Transient(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn from_status(status: StatusCode, engine: &str) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                EngineError::RateLimited(format!("{} returned 429", engine))
            }
            StatusCode::FORBIDDEN | StatusCode::SERVICE_UNAVAILABLE => {
                EngineError::RateLimited(format!("{} returned {}", engine, status))
            }
            s => EngineError::Transient(format!("{} returned {}", engine, s)),
        }
    }
}

/// One search back-end. Adapters never block the scheduler; vendor SDK
/// style calls are plain HTTP here and per-engine backoff lives inside the
/// adapter, not in the manager.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError>;
}

/// Recency windows fanned out by engines that support time-ranged search.
pub const RECENCY_WINDOWS: [&str; 3] = ["day", "week", "month"];

/// Recall variants for a keyword: the keyword itself, an exact-phrase form,
/// and narrowing operators that tend to surface primary sources.
pub fn expand_queries(keyword: &str) -> Vec<String> {
    let kw = keyword.trim();
    if kw.is_empty() {
        return Vec::new();
    }
    vec![
        kw.to_string(),
        format!("\"{}\"", kw),
        format!("{} filetype:pdf", kw),
        format!("{} site:gov", kw),
        format!("{} site:edu", kw),
    ]
}

pub(crate) const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

/// GET an HTML page with browser-ish headers. Engines that scrape SERPs
/// share this so header handling stays in one place.
pub(crate) async fn fetch_html(
    client: &reqwest::Client,
    url: reqwest::Url,
    timeout: std::time::Duration,
) -> Result<(StatusCode, String), EngineError> {
    let resp = client
        .get(url)
        .header("User-Agent", DESKTOP_USER_AGENT)
        .header("Accept", "text/html,application/xhtml+xml")
        .header("Accept-Language", "en-US,en;q=0.9")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| EngineError::Transient(e.to_string()))?;

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Ok((status, body))
}
