use super::{expand_queries, EngineError, SearchEngine, DESKTOP_USER_AGENT, RECENCY_WINDOWS};
use crate::types::SearchResult;
use async_trait::async_trait;
use futures::future::join_all;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Public SearxNG instances come and go; the adapter probes a shuffled
/// candidate pool at first use and caches the first healthy endpoint for
/// the process lifetime.
pub struct SearxngEngine {
    client: reqwest::Client,
    endpoints: Vec<String>,
    timeout: Duration,
    good_endpoint: OnceCell<Option<String>>,
}

const DEFAULT_ENDPOINTS: [&str; 5] = [
    "https://searx.be",
    "https://searxng.nicfab.eu",
    "https://search.ononoki.org",
    "https://searx.tiekoetter.com",
    "https://nx.tcit.fr/searx",
];

#[derive(Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngItem>,
}

#[derive(Deserialize)]
struct SearxngItem {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "publishedDate")]
    published_date: Option<String>,
}

impl SearxngEngine {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoints(
            client,
            DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn with_endpoints(client: reqwest::Client, endpoints: Vec<String>) -> Self {
        Self {
            client,
            endpoints,
            timeout: Duration::from_secs(8),
            good_endpoint: OnceCell::new(),
        }
    }

    /// Probe `/search?q=test&format=json` on shuffled candidates; first
    /// 200 OK wins and is cached for the process lifetime.
    async fn pick_endpoint(&self) -> Option<String> {
        self.good_endpoint
            .get_or_init(|| async {
                let mut candidates = self.endpoints.clone();
                candidates.shuffle(&mut rand::rng());
                for base in candidates {
                    let base = base.trim_end_matches('/').to_string();
                    let probe = format!("{}/search?q=test&format=json&categories=general", base);
                    let resp = self
                        .client
                        .get(&probe)
                        .header("User-Agent", DESKTOP_USER_AGENT)
                        .timeout(self.timeout)
                        .send()
                        .await;
                    match resp {
                        Ok(r) if r.status().is_success() => {
                            info!("searxng endpoint selected: {}", base);
                            return Some(base);
                        }
                        Ok(r) => debug!("searxng probe {} -> {}", base, r.status()),
                        Err(e) => debug!("searxng probe {} failed: {}", base, e),
                    }
                }
                None
            })
            .await
            .clone()
    }

    async fn run_one(
        &self,
        base: &str,
        query: &str,
        time_range: Option<&str>,
    ) -> Vec<SearchResult> {
        let mut req = self
            .client
            .get(format!("{}/search", base))
            .header("User-Agent", DESKTOP_USER_AGENT)
            .timeout(self.timeout)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("categories", "general"),
                ("language", "en"),
            ]);
        if let Some(tr) = time_range {
            req = req.query(&[("time_range", tr)]);
        }

        let data: SearxngResponse = match req.send().await {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(d) => d,
                Err(_) => return Vec::new(),
            },
            _ => return Vec::new(),
        };

        data.results
            .into_iter()
            .filter_map(|item| {
                let href = item.url.filter(|u| !u.trim().is_empty())?;
                Some(SearchResult {
                    title: item.title.unwrap_or_default(),
                    href,
                    body: item.content.unwrap_or_default(),
                    source: "searxng".to_string(),
                    published: item.published_date.filter(|p| !p.trim().is_empty()),
                })
            })
            .collect()
    }
}

#[async_trait]
impl SearchEngine for SearxngEngine {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(
        &self,
        keyword: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError> {
        let Some(base) = self.pick_endpoint().await else {
            return Err(EngineError::Transient(
                "no healthy searxng endpoint".to_string(),
            ));
        };

        // Fan out: keyword + recall variants without a time range, plus the
        // raw keyword over each recency window.
        let mut runs: Vec<(String, Option<&str>)> = expand_queries(keyword)
            .into_iter()
            .map(|q| (q, None))
            .collect();
        for window in RECENCY_WINDOWS {
            runs.push((keyword.to_string(), Some(window)));
        }

        let futs = runs
            .iter()
            .map(|(q, tr)| self.run_one(&base, q, *tr));
        let results: Vec<SearchResult> = join_all(futs).await.into_iter().flatten().collect();
        Ok(results)
    }
}
