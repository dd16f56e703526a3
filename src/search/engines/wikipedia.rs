use super::{EngineError, SearchEngine, DESKTOP_USER_AGENT};
use crate::types::SearchResult;
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use scraper::Html;
use serde::Deserialize;
use std::time::Duration;

/// MediaWiki search API adapter. Optional; enabled by `include_wikipedia`.
pub struct WikipediaEngine {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    query: Option<QuerySection>,
}

#[derive(Deserialize)]
struct QuerySection {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl WikipediaEngine {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

// Percent-encode everything except the characters MediaWiki titles keep
// verbatim in article paths.
const TITLE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'-')
    .remove(b'.')
    .remove(b'~');

fn article_url(title: &str) -> String {
    let slug = title.replace(' ', "_");
    format!(
        "https://en.wikipedia.org/wiki/{}",
        utf8_percent_encode(&slug, TITLE_ENCODE_SET)
    )
}

/// Search snippets come back as HTML with `<span class="searchmatch">`
/// highlighting; strip to plain text.
fn strip_snippet_html(snippet: &str) -> String {
    let fragment = Html::parse_fragment(snippet);
    let text: Vec<&str> = fragment.root_element().text().collect();
    text.join("").split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl SearchEngine for WikipediaEngine {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    async fn search(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError> {
        let limit = max_results.min(20).to_string();
        let resp = self
            .client
            .get("https://en.wikipedia.org/w/api.php")
            .header("User-Agent", DESKTOP_USER_AGENT)
            .timeout(Duration::from_secs(8))
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", keyword),
                ("format", "json"),
                ("srlimit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::from_status(resp.status(), "wikipedia"));
        }

        let data: ApiResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Transient(format!("wikipedia decode: {}", e)))?;

        let hits = data.query.map(|q| q.search).unwrap_or_default();
        Ok(hits
            .into_iter()
            .filter(|hit| !hit.title.trim().is_empty())
            .map(|hit| SearchResult {
                href: article_url(&hit.title),
                body: strip_snippet_html(&hit.snippet),
                title: hit.title,
                source: "wikipedia".to_string(),
                published: None,
            })
            .collect())
    }
}
