pub mod engines;
pub mod rerank;

use crate::core::config::{self, SessionConfig};
use crate::types::SearchResult;
use engines::SearchEngine;
use tracing::{debug, info, warn};

pub use engines::EngineError;
pub use rerank::rerank;

/// Multiplexes a keyword across an ordered list of back-ends.
///
/// Engines are called in priority order; any error is logged and treated as
/// an empty result set, so a dead or rate-limited engine simply falls
/// through to the next one. Results are concatenated, never interleaved.
pub struct EngineManager {
    engines: Vec<Box<dyn SearchEngine>>,
}

impl EngineManager {
    pub fn new(engines: Vec<Box<dyn SearchEngine>>) -> Self {
        Self { engines }
    }

    /// Build the default fallback chain from config + environment:
    /// Tavily (keyed) → DuckDuckGo → SearxNG → Wikipedia (opt-in) → Brave
    /// (keyed).
    pub fn from_config(client: reqwest::Client, cfg: &SessionConfig) -> Self {
        let mut engines: Vec<Box<dyn SearchEngine>> = Vec::new();

        if let Some(key) = config::tavily_api_key() {
            engines.push(Box::new(engines::tavily::TavilyEngine::new(
                client.clone(),
                key,
            )));
        }
        engines.push(Box::new(engines::duckduckgo::DuckDuckGoEngine::new(
            client.clone(),
        )));
        engines.push(Box::new(engines::searxng::SearxngEngine::new(
            client.clone(),
        )));
        if cfg.include_wikipedia {
            engines.push(Box::new(engines::wikipedia::WikipediaEngine::new(
                client.clone(),
            )));
        }
        if let Some(token) = config::brave_api_key() {
            engines.push(Box::new(engines::brave::BraveEngine::new(client, token)));
        }

        info!(
            "engine chain: [{}]",
            engines
                .iter()
                .map(|e| e.name())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Self { engines }
    }

    pub fn engine_names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Query each engine in order, concatenating whatever comes back.
    ///
    /// Early termination: once the aggregate reaches 2×`max_results`, the
    /// remaining engines are skipped. An empty final list is a valid
    /// result; no engine failure can abort the call.
    pub async fn search(&self, keyword: &str, max_results: usize) -> Vec<SearchResult> {
        let mut aggregate: Vec<SearchResult> = Vec::new();

        for engine in &self.engines {
            let chunk = match engine.search(keyword, max_results).await {
                Ok(results) => results,
                Err(e) => {
                    warn!("engine {} error: {}", engine.name(), e);
                    Vec::new()
                }
            };
            if !chunk.is_empty() {
                debug!("engine {} returned {} results", engine.name(), chunk.len());
                aggregate.extend(chunk);
            }
            if aggregate.len() >= max_results * 2 {
                debug!(
                    "early termination after {} with {} results",
                    engine.name(),
                    aggregate.len()
                );
                break;
            }
        }

        aggregate
    }
}
