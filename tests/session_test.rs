/// End-to-end session scenarios, fully offline: engines, fetcher, LLM, and
/// embedder are all stubbed at their seams.
use anyhow::Result;
use async_trait::async_trait;
use sagecrawl::config::SessionConfig;
use sagecrawl::llm::{LlmManager, LlmProvider};
use sagecrawl::search::engines::{EngineError, SearchEngine};
use sagecrawl::search::EngineManager;
use sagecrawl::session::{SearchSession, SessionDeps};
use sagecrawl::types::{FetchedPage, SearchResult};
use sagecrawl::util::url_hash;
use sagecrawl::{Embedder, PageFetcher, RetrievalFamily};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ───────────────────────── stub seams ─────────────────────────

/// Embedder with fixed vectors for known texts and a default for the rest.
struct MapEmbedder {
    map: HashMap<String, Vec<f32>>,
    default: Vec<f32>,
}

impl MapEmbedder {
    fn new(entries: &[(&str, [f32; 2])]) -> Self {
        Self {
            map: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
            default: vec![0.6, 0.8],
        }
    }
}

impl Embedder for MapEmbedder {
    fn dimension(&self) -> usize {
        2
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = self
            .map
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

/// LLM stub: fixed enhancement, echo summaries, fixed final answer.
struct StubLlm {
    enhance_to: Option<String>,
    fail_final: bool,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn provider_name(&self) -> String {
        "stub".to_string()
    }

    async fn generate(&self, prompt: &str, _system: Option<&str>) -> Result<String> {
        if prompt.starts_with("Original Query:") {
            return match &self.enhance_to {
                Some(enhanced) => Ok(format!("Final Enhanced Query: {}", enhanced)),
                None => anyhow::bail!("enhancement unavailable"),
            };
        }
        if prompt.contains("expert research analyst") {
            if self.fail_final {
                anyhow::bail!("model overloaded");
            }
            return Ok("# Research Report\n\nFindings synthesized.".to_string());
        }
        Ok("branch summary".to_string())
    }
}

/// Engine that always rate-limits, like DDG on a bad day.
struct RateLimitedEngine;

#[async_trait]
impl SearchEngine for RateLimitedEngine {
    fn name(&self) -> &'static str {
        "ddg"
    }

    async fn search(
        &self,
        _keyword: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError> {
        Err(EngineError::RateLimited("429 from upstream".to_string()))
    }
}

/// Engine returning a fixed result set under the searxng tag.
struct FixedEngine {
    results: Vec<SearchResult>,
}

impl FixedEngine {
    fn searxng(count: usize) -> Self {
        let results = (0..count)
            .map(|i| SearchResult {
                title: format!("Result {}", i),
                href: format!("https://site{}.example.org/article", i),
                body: format!("snippet {}", i),
                source: "searxng".to_string(),
                published: None,
            })
            .collect();
        Self { results }
    }
}

#[async_trait]
impl SearchEngine for FixedEngine {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(
        &self,
        _keyword: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError> {
        Ok(self.results.clone())
    }
}

/// Fetcher that writes a small HTML file per URL instead of hitting the
/// network.
struct StubFetcher;

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn download(&self, urls: &[String], out_dir: &Path) -> Vec<FetchedPage> {
        tokio::fs::create_dir_all(out_dir).await.unwrap();
        let mut pages = Vec::new();
        for url in urls {
            let html = format!(
                "<html><body><article><p>Downloaded content for {}</p></article></body></html>",
                url
            );
            let path = out_dir.join(format!("{}.html", url_hash(url)));
            tokio::fs::write(&path, &html).await.unwrap();
            pages.push(FetchedPage {
                url: url.clone(),
                file_path: path.to_string_lossy().to_string(),
                content_type: "text/html".to_string(),
                size: html.len() as u64,
            });
        }
        pages
    }
}

// ───────────────────────── wiring helpers ─────────────────────────

fn temp_results_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sagecrawl-it-{}-{}", tag, uuid::Uuid::new_v4()))
}

fn config_with(results_dir: PathBuf, min_relevance: f32) -> SessionConfig {
    let mut cfg = SessionConfig::default();
    cfg.results_base_dir = results_dir;
    cfg.min_relevance = min_relevance;
    cfg.monte_carlo_search = false;
    cfg
}

fn deps(
    embedder: Arc<dyn Embedder>,
    llm: StubLlm,
    engines: Vec<Box<dyn SearchEngine>>,
) -> SessionDeps {
    SessionDeps {
        embedder,
        ocr: None,
        llm: Arc::new(LlmManager::new(Arc::new(llm), None)),
        engines: Arc::new(EngineManager::new(engines)),
        fetcher: Arc::new(StubFetcher),
        family: RetrievalFamily::Text,
        corpus_dir: None,
        max_depth: 1,
        top_k: 3,
        web_search_enabled: true,
        rng_seed: Some(42),
        progress: None,
    }
}

// ───────────────────────── scenarios ─────────────────────────

#[tokio::test]
async fn empty_query_session_completes_without_web_nodes() {
    let results_dir = temp_results_dir("empty");
    let cfg = config_with(results_dir.clone(), 0.5);
    let embedder: Arc<dyn Embedder> = Arc::new(MapEmbedder::new(&[]));

    // Enhancement fails, so the raw (empty) query carries through.
    let llm = StubLlm {
        enhance_to: None,
        fail_final: false,
    };
    let deps = deps(embedder, llm, vec![Box::new(FixedEngine::searxng(3))]);

    let mut session = SearchSession::new("", cfg, deps).await.unwrap();
    let answer = session.run().await.unwrap();

    assert!(answer.contains("Research Report"));
    assert!(session.toc_tree().is_empty());
    assert!(session.web_results().is_empty());

    std::fs::remove_dir_all(&results_dir).ok();
}

#[tokio::test]
async fn rate_limited_engine_falls_back_to_searxng() {
    let results_dir = temp_results_dir("fallback");
    let cfg = config_with(results_dir.clone(), 0.0);
    let embedder: Arc<dyn Embedder> = Arc::new(MapEmbedder::new(&[]));

    let llm = StubLlm {
        enhance_to: Some("renewable aviation fuel pathways".to_string()),
        fail_final: false,
    };
    let deps = deps(
        embedder,
        llm,
        vec![
            Box::new(RateLimitedEngine),
            Box::new(FixedEngine::searxng(5)),
        ],
    );

    let mut session = SearchSession::new("aviation fuel", cfg, deps).await.unwrap();
    session.run().await.unwrap();

    let web = session.web_results();
    assert_eq!(web.len(), 5);
    assert!(web.iter().all(|r| r.source_engine == "searxng"));

    // Dedupe invariant: all admitted URLs are unique.
    let mut urls: Vec<&str> = web.iter().map(|r| r.url.as_str()).collect();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 5);

    // One branch, five results, five distinct domains in the grouping.
    assert_eq!(session.toc_tree().len(), 1);
    assert_eq!(session.toc_tree()[0].metrics.web_results_count, 5);
    assert_eq!(session.grouped_web_results().len(), 5);

    // Sidecars were written next to each artifact.
    for (_, pages) in session.grouped_web_results() {
        for page in pages {
            assert!(
                Path::new(&format!("{}.json", page.file_path)).exists(),
                "missing sidecar for {}",
                page.url
            );
        }
    }

    std::fs::remove_dir_all(&results_dir).ok();
}

#[tokio::test]
async fn relevance_gate_prunes_low_scoring_branch() {
    let results_dir = temp_results_dir("gate");
    let cfg = config_with(results_dir.clone(), 0.5);

    let enhanced = "Relevant subtopic alpha. Offtopic subtopic zebra";
    let embedder: Arc<dyn Embedder> = Arc::new(MapEmbedder::new(&[
        (enhanced, [1.0, 0.0]),
        ("Relevant subtopic alpha", [0.8, 0.6]), // cosine 0.8
        ("Offtopic subtopic zebra", [0.2, 0.98]), // cosine ~0.2
    ]));

    let llm = StubLlm {
        enhance_to: Some(enhanced.to_string()),
        fail_final: false,
    };
    let deps = deps(embedder, llm, vec![Box::new(FixedEngine::searxng(2))]);

    let mut session = SearchSession::new("alpha topic", cfg, deps).await.unwrap();
    session.run().await.unwrap();

    let tree = session.toc_tree();
    assert_eq!(tree.len(), 1, "only the relevant branch survives");
    assert_eq!(tree[0].query_text, "Relevant subtopic alpha");
    assert!(tree[0].relevance_score >= 0.5);

    // Monotone gating: nothing below the floor anywhere in the tree.
    fn check(nodes: &[sagecrawl::session::toc::TocNode], floor: f32) {
        for n in nodes {
            assert!(n.relevance_score >= floor);
            check(&n.children, floor);
        }
    }
    check(tree, 0.5);

    std::fs::remove_dir_all(&results_dir).ok();
}

#[tokio::test]
async fn toc_depth_and_parent_invariants_hold() {
    let results_dir = temp_results_dir("toc");
    let cfg = config_with(results_dir.clone(), 0.0);
    let embedder: Arc<dyn Embedder> = Arc::new(MapEmbedder::new(&[]));

    let llm = StubLlm {
        enhance_to: Some("Topic one branch. Topic two branch".to_string()),
        fail_final: false,
    };
    let deps = deps(embedder, llm, vec![Box::new(FixedEngine::searxng(2))]);

    let mut session = SearchSession::new("two branches", cfg, deps).await.unwrap();
    session.run().await.unwrap();

    fn check(nodes: &[sagecrawl::session::toc::TocNode], max_depth: usize) {
        for n in nodes {
            assert!(n.depth >= 1 && n.depth <= max_depth);
            assert!(n.parent_query.is_some());
            for c in &n.children {
                assert_eq!(c.depth, n.depth + 1);
                assert_eq!(c.parent_query.as_deref(), Some(n.query_text.as_str()));
            }
            check(&n.children, max_depth);
        }
    }
    check(session.toc_tree(), 1);

    std::fs::remove_dir_all(&results_dir).ok();
}

#[tokio::test]
async fn final_llm_failure_fails_the_session() {
    let results_dir = temp_results_dir("fail");
    let cfg = config_with(results_dir.clone(), 0.0);
    let embedder: Arc<dyn Embedder> = Arc::new(MapEmbedder::new(&[]));

    let llm = StubLlm {
        enhance_to: Some("any topic at all".to_string()),
        fail_final: true,
    };
    let deps = deps(embedder, llm, vec![Box::new(FixedEngine::searxng(1))]);

    let mut session = SearchSession::new("doomed", cfg, deps).await.unwrap();
    let err = session.run().await.unwrap_err();
    assert!(format!("{:#}", err).contains("model overloaded"));

    let outcome = session.outcome(None, Some(err.to_string()));
    assert_eq!(
        serde_json::to_value(outcome.status).unwrap(),
        serde_json::json!("failed")
    );

    std::fs::remove_dir_all(&results_dir).ok();
}

#[tokio::test]
async fn report_and_toc_artifacts_are_written() {
    let results_dir = temp_results_dir("artifacts");
    let cfg = config_with(results_dir.clone(), 0.0);
    let embedder: Arc<dyn Embedder> = Arc::new(MapEmbedder::new(&[]));

    let llm = StubLlm {
        enhance_to: Some("single branch topic".to_string()),
        fail_final: false,
    };
    let deps = deps(embedder, llm, vec![Box::new(FixedEngine::searxng(3))]);

    let mut session = SearchSession::new("artifact check", cfg, deps).await.unwrap();
    let answer = session.run().await.unwrap();
    let report_path = session.save_report(&answer).unwrap();

    assert!(report_path.exists());
    assert!(report_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_output.md"));
    assert!(session.base_result_dir().join("final_report.md").exists());
    assert!(session.base_result_dir().join("toc_analysis.json").exists());

    let md = std::fs::read_to_string(&report_path).unwrap();
    assert!(md.contains("## Web Search Results"));
    assert!(md.contains("## Grouped Web Results by Domain"));

    // Downloaded artifacts live under web_<sanitized-subquery>/.
    let has_web_dir = std::fs::read_dir(session.base_result_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().starts_with("web_"));
    assert!(has_web_dir);

    std::fs::remove_dir_all(&results_dir).ok();
}

#[tokio::test]
async fn corpus_entries_are_unit_norm_and_tagged_webhtml() {
    let results_dir = temp_results_dir("norm");
    let cfg = config_with(results_dir.clone(), 0.0);
    let embedder: Arc<dyn Embedder> = Arc::new(MapEmbedder::new(&[]));

    let llm = StubLlm {
        enhance_to: Some("vector check".to_string()),
        fail_final: false,
    };
    let deps = deps(embedder, llm, vec![Box::new(FixedEngine::searxng(2))]);

    let mut session = SearchSession::new("vectors", cfg, deps).await.unwrap();
    session.run().await.unwrap();

    let tree = session.toc_tree();
    assert_eq!(tree.len(), 1);
    assert!(!tree[0].corpus_entries.is_empty());
    for entry in &tree[0].corpus_entries {
        let norm: f32 = entry.embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "embedding norm {}", norm);
        assert_eq!(
            serde_json::to_value(&entry.metadata).unwrap()["type"],
            "webhtml"
        );
    }

    std::fs::remove_dir_all(&results_dir).ok();
}
