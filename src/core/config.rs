use serde::Deserialize;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// SessionConfig — file-based config loader (sagecrawl.json) with env-var
// fallback per key.
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "SAGECRAWL_CONFIG";
pub const ENV_TAVILY_API_KEY: &str = "TAVILY_API_KEY";
pub const ENV_BRAVE_API_KEY: &str = "BRAVE_API_KEY";
pub const ENV_MODEL2VEC_MODEL: &str = "MODEL2VEC_MODEL";

/// Flat session configuration. Every field has a default; `sagecrawl.json`
/// overrides defaults, and `SAGECRAWL_<KEY>` env vars override the file.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SessionConfig {
    /// Root for per-session output directories.
    pub results_base_dir: PathBuf,
    /// Split threshold for sub-query chunking (chars).
    pub max_query_length: usize,
    /// Enable weighted sub-query sampling.
    pub monte_carlo_search: bool,
    /// How many sub-queries Monte Carlo keeps.
    pub monte_carlo_samples: usize,
    /// Branch-pruning threshold on unit-cosine similarity.
    pub min_relevance: f32,
    /// top_n per sub-query after rerank.
    pub web_search_limit: usize,
    /// Download semaphore width.
    pub web_concurrency: usize,
    /// Enable the Wikipedia adapter.
    pub include_wikipedia: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            results_base_dir: PathBuf::from("results"),
            max_query_length: 200,
            monte_carlo_search: true,
            monte_carlo_samples: 3,
            min_relevance: 0.5,
            web_search_limit: 5,
            web_concurrency: 8,
            include_wikipedia: false,
        }
    }
}

impl SessionConfig {
    /// Apply `SAGECRAWL_*` env-var overrides on top of whatever was loaded.
    fn apply_env_overrides(mut self) -> Self {
        if let Some(v) = env_string("SAGECRAWL_RESULTS_BASE_DIR") {
            self.results_base_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parse::<usize>("SAGECRAWL_MAX_QUERY_LENGTH") {
            self.max_query_length = v;
        }
        if let Some(v) = env_bool("SAGECRAWL_MONTE_CARLO_SEARCH") {
            self.monte_carlo_search = v;
        }
        if let Some(v) = env_parse::<usize>("SAGECRAWL_MONTE_CARLO_SAMPLES") {
            self.monte_carlo_samples = v;
        }
        if let Some(v) = env_parse::<f32>("SAGECRAWL_MIN_RELEVANCE") {
            self.min_relevance = v;
        }
        if let Some(v) = env_parse::<usize>("SAGECRAWL_WEB_SEARCH_LIMIT") {
            self.web_search_limit = v;
        }
        if let Some(v) = env_parse::<usize>("SAGECRAWL_WEB_CONCURRENCY") {
            self.web_concurrency = v;
        }
        if let Some(v) = env_bool("SAGECRAWL_INCLUDE_WIKIPEDIA") {
            self.include_wikipedia = v;
        }
        self
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| {
        !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        )
    })
}

/// Load `sagecrawl.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `SAGECRAWL_CONFIG` env var path
/// 2. `./sagecrawl.json` (process cwd)
/// 3. `../sagecrawl.json` (one level up)
///
/// Missing file → defaults. Parse error → log a warning, use defaults.
/// Env-var overrides apply in every case.
pub fn load_config() -> SessionConfig {
    let candidates: Vec<PathBuf> = {
        let mut v = vec![
            PathBuf::from("sagecrawl.json"),
            PathBuf::from("../sagecrawl.json"),
        ];
        if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
            v.insert(0, PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<SessionConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("sagecrawl.json loaded from {}", path.display());
                    return cfg.apply_env_overrides();
                }
                Err(e) => {
                    tracing::warn!(
                        "sagecrawl.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return SessionConfig::default().apply_env_overrides();
                }
            },
            Err(_) => continue,
        }
    }

    SessionConfig::default().apply_env_overrides()
}

/// Tavily API key, when the adapter should be enabled at all.
pub fn tavily_api_key() -> Option<String> {
    env_string(ENV_TAVILY_API_KEY)
}

/// Brave Search subscription token, when the adapter should be enabled.
pub fn brave_api_key() -> Option<String> {
    env_string(ENV_BRAVE_API_KEY)
}

/// Model2Vec model id for the text embedder.
pub fn model2vec_model_id() -> String {
    env_string(ENV_MODEL2VEC_MODEL).unwrap_or_else(|| "minishlab/potion-base-8M".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.results_base_dir, PathBuf::from("results"));
        assert_eq!(cfg.max_query_length, 200);
        assert!(cfg.monte_carlo_search);
        assert_eq!(cfg.monte_carlo_samples, 3);
        assert!((cfg.min_relevance - 0.5).abs() < f32::EPSILON);
        assert_eq!(cfg.web_search_limit, 5);
        assert_eq!(cfg.web_concurrency, 8);
        assert!(!cfg.include_wikipedia);
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_keys() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{"web_search_limit": 9, "include_wikipedia": true}"#).unwrap();
        assert_eq!(cfg.web_search_limit, 9);
        assert!(cfg.include_wikipedia);
        assert_eq!(cfg.web_concurrency, 8);
    }
}
