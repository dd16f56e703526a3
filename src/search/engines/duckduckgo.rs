use super::{fetch_html, EngineError, SearchEngine};
use crate::types::SearchResult;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::warn;

/// DuckDuckGo HTML SERP adapter. Rate-limit prone: up to three attempts
/// with exponential backoff, returning on the first non-empty result set.
pub struct DuckDuckGoEngine {
    client: reqwest::Client,
}

const MAX_ATTEMPTS: u32 = 3;

impl DuckDuckGoEngine {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn normalize_ddg_href(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    // Protocol-relative URLs.
    let candidate = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };

    // Redirect links carry the real destination in the `uddg` parameter.
    if let Ok(url) = url::Url::parse(&candidate) {
        if matches!(url.host_str(), Some("duckduckgo.com")) && url.path().starts_with("/l/") {
            for (k, v) in url.query_pairs() {
                if k == "uddg" && !v.trim().is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }

    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return Some(candidate);
    }

    None
}

pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let doc = Html::parse_document(html);
    let sel_item = Selector::parse("div.results_links, div.result").unwrap();
    let sel_link = Selector::parse("a.result__a").unwrap();
    let sel_snip = Selector::parse("a.result__snippet, div.result__snippet").unwrap();

    let mut out = Vec::new();
    for item in doc.select(&sel_item) {
        if out.len() >= max_results {
            break;
        }

        let link = match item.select(&sel_link).next() {
            Some(l) => l,
            None => continue,
        };
        let href_raw = link.value().attr("href").unwrap_or("");
        let Some(href) = normalize_ddg_href(href_raw) else {
            continue;
        };
        let title = link.text().collect::<Vec<_>>().join(" ");
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");

        let body = item
            .select(&sel_snip)
            .next()
            .map(|n| n.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        let body = body.split_whitespace().collect::<Vec<_>>().join(" ");

        out.push(SearchResult {
            title,
            href,
            body,
            source: "ddg".to_string(),
            published: None,
        });
    }

    out
}

#[async_trait]
impl SearchEngine for DuckDuckGoEngine {
    fn name(&self) -> &'static str {
        "ddg"
    }

    async fn search(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError> {
        let mut url = reqwest::Url::parse("https://duckduckgo.com/html/")
            .map_err(|e| EngineError::Fatal(e.to_string()))?;
        url.query_pairs_mut().append_pair("q", keyword);

        let mut last_err: Option<EngineError> = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                // 2^attempt seconds between retries.
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            }

            match fetch_html(&self.client, url.clone(), Duration::from_secs(15)).await {
                Ok((status, body)) => {
                    if !status.is_success() {
                        last_err = Some(EngineError::from_status(status, "ddg"));
                        warn!("ddg attempt {}/{}: HTTP {}", attempt + 1, MAX_ATTEMPTS, status);
                        continue;
                    }
                    let results = parse_results(&body, max_results);
                    if !results.is_empty() {
                        return Ok(results);
                    }
                    warn!("ddg attempt {}/{}: parsed 0 results", attempt + 1, MAX_ATTEMPTS);
                }
                Err(e) => {
                    warn!("ddg attempt {}/{}: {}", attempt + 1, MAX_ATTEMPTS, e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            // All attempts parsed cleanly but found nothing; that is a
            // valid (empty) answer, not a failure.
            None => Ok(Vec::new()),
        }
    }
}
