pub mod monte_carlo;
pub mod toc;

use crate::core::config::SessionConfig;
use crate::crawl::{self, extract, PageFetcher};
use crate::embed::corpus::load_corpus_from_dir;
use crate::embed::kb::{CorpusEntry, EntryKind, EntryMetadata, KnowledgeBase};
use crate::embed::{embed_blocking, late_interaction_score, Embedder, OcrEngine, RetrievalFamily};
use crate::llm::LlmManager;
use crate::report;
use crate::search::{rerank, EngineManager};
use crate::types::{
    DomainPage, FetchedPage, ProgressUpdate, SearchResult, SessionOutcome, SessionStatus,
    WebResult,
};
use crate::util::{sanitize_filename, truncate_chars};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use monte_carlo::MonteCarloOutcome;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use toc::{build_toc_string, now_iso, save_toc_to_json, TocNode};
use tracing::{debug, info, warn};

/// Strip formatting marks an LLM tends to emit (`*`, `_`, backticks) and
/// collapse whitespace.
pub fn clean_search_query(query: &str) -> String {
    let stripped: String = query
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`'))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split an enhanced query into sub-queries: sentences are greedily packed
/// into chunks of at most `max_len` chars. Sentences without any
/// alphanumeric content are dropped. An empty query yields no sub-queries.
pub fn split_query(query: &str, max_len: usize) -> Vec<String> {
    let query = query.replace(['"', '\''], "");
    let mut subqueries = Vec::new();
    let mut current = String::new();

    for sentence in query.split('.') {
        let sentence = sentence.trim();
        if sentence.is_empty() || !sentence.chars().any(|c| c.is_alphanumeric()) {
            continue;
        }
        if current.is_empty() {
            current = sentence.to_string();
        } else if current.len() + sentence.len() + 2 <= max_len {
            current.push_str(". ");
            current.push_str(sentence);
        } else {
            subqueries.push(std::mem::replace(&mut current, sentence.to_string()));
        }
    }
    if !current.is_empty() {
        subqueries.push(current);
    }
    subqueries.retain(|sq| !sq.trim().is_empty());
    subqueries
}

/// Everything a session needs injected. Production wiring lives in the
/// binary; tests substitute stubs at each seam.
pub struct SessionDeps {
    pub embedder: Arc<dyn Embedder>,
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub llm: Arc<LlmManager>,
    pub engines: Arc<EngineManager>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub family: RetrievalFamily,
    pub corpus_dir: Option<PathBuf>,
    pub max_depth: usize,
    pub top_k: usize,
    pub web_search_enabled: bool,
    /// Seed for the Monte-Carlo RNG; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
    pub progress: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

struct Expansion {
    web_results: Vec<WebResult>,
    corpus_entries: Vec<CorpusEntry>,
    toc_nodes: Vec<TocNode>,
}

/// One research session: built for one user query, driven to a final
/// report, then serialized and dropped.
pub struct SearchSession {
    query: String,
    config: SessionConfig,
    query_id: String,
    base_result_dir: PathBuf,
    deps: SessionDeps,
    enhanced_query: String,
    enhanced_query_embedding: Vec<f32>,
    kb: KnowledgeBase,
    rng: StdRng,
    monte_carlo: Option<MonteCarloOutcome>,
    web_results: Vec<WebResult>,
    grouped_web_results: BTreeMap<String, Vec<DomainPage>>,
    pages_by_url: BTreeMap<String, FetchedPage>,
    local_results: Vec<CorpusEntry>,
    toc_tree: Vec<TocNode>,
    reference_links: Vec<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started: Instant,
}

impl SearchSession {
    /// Build the session: allocate the result directory, enhance the query
    /// (LLM failure degrades to the raw query), embed the similarity
    /// anchor, and seed the knowledge base from the local corpus.
    pub async fn new(query: &str, config: SessionConfig, deps: SessionDeps) -> Result<Self> {
        let query_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let base_result_dir = config.results_base_dir.join(&query_id);
        tokio::fs::create_dir_all(&base_result_dir)
            .await
            .with_context(|| format!("creating {}", base_result_dir.display()))?;

        info!("initializing session query_id={}", query_id);

        let enhanced_query = {
            let enhanced = deps.llm.enhance_query(query).await;
            if enhanced.trim().is_empty() {
                query.to_string()
            } else {
                enhanced
            }
        };
        debug!("enhanced query: {}", enhanced_query);

        let enhanced_query_embedding =
            embed_blocking(Arc::clone(&deps.embedder), enhanced_query.clone()).await?;

        let mut kb = KnowledgeBase::new(Arc::clone(&deps.embedder));
        if let Some(corpus_dir) = deps.corpus_dir.clone() {
            let embedder = Arc::clone(&deps.embedder);
            let ocr = deps.ocr.clone();
            let family = deps.family;
            let local_docs = tokio::task::spawn_blocking(move || {
                load_corpus_from_dir(&corpus_dir, embedder.as_ref(), family, ocr.as_deref())
            })
            .await
            .context("corpus load task failed")?;
            kb.add_documents(local_docs);
        }

        let rng = match deps.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            query: query.to_string(),
            config,
            query_id,
            base_result_dir,
            deps,
            enhanced_query,
            enhanced_query_embedding,
            kb,
            rng,
            monte_carlo: None,
            web_results: Vec::new(),
            grouped_web_results: BTreeMap::new(),
            pages_by_url: BTreeMap::new(),
            local_results: Vec::new(),
            toc_tree: Vec::new(),
            reference_links: Vec::new(),
            created_at: chrono::Utc::now(),
            started: Instant::now(),
        })
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn enhanced_query(&self) -> &str {
        &self.enhanced_query
    }

    pub fn base_result_dir(&self) -> &Path {
        &self.base_result_dir
    }

    pub fn web_results(&self) -> &[WebResult] {
        &self.web_results
    }

    pub fn local_results(&self) -> &[CorpusEntry] {
        &self.local_results
    }

    pub fn toc_tree(&self) -> &[TocNode] {
        &self.toc_tree
    }

    pub fn grouped_web_results(&self) -> &BTreeMap<String, Vec<DomainPage>> {
        &self.grouped_web_results
    }

    pub fn knowledge_base_len(&self) -> usize {
        self.kb.len()
    }

    fn emit(&self, status: SessionStatus, message: &str, progress_percentage: u8) {
        if let Some(sender) = &self.deps.progress {
            let _ = sender.send(ProgressUpdate {
                query_id: self.query_id.clone(),
                status,
                message: message.to_string(),
                progress_percentage,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Drive the whole pipeline and return the final answer. Only a
    /// failure of the final LLM call propagates; everything upstream
    /// degrades branch by branch.
    pub async fn run(&mut self) -> Result<String> {
        self.emit(SessionStatus::Processing, "session started", 5);
        info!(
            "starting session query_id={} max_depth={}",
            self.query_id, self.deps.max_depth
        );

        let plain_enhanced = clean_search_query(&self.enhanced_query);
        let mut subqueries = split_query(&plain_enhanced, self.config.max_query_length);
        info!("generated {} initial sub-queries", subqueries.len());

        if self.config.monte_carlo_search && !subqueries.is_empty() {
            subqueries = self.monte_carlo_subqueries(subqueries).await;
        }

        if self.deps.web_search_enabled && self.deps.max_depth >= 1 {
            self.emit(SessionStatus::Processing, "web expansion", 20);
            let expansion = self.expand(subqueries, 1, None).await?;
            self.web_results = expansion.web_results;
            self.toc_tree = expansion.toc_nodes;
            self.grouped_web_results =
                crawl::group_web_results_by_domain(&self.web_results, &self.pages_by_url);
            self.kb.add_documents(expansion.corpus_entries);
        } else {
            info!("web search disabled or max_depth < 1; skipping expansion");
        }

        self.emit(SessionStatus::Processing, "local retrieval", 70);
        self.local_results = self
            .kb
            .search_by_embedding(&self.enhanced_query_embedding, self.deps.top_k);

        self.emit(SessionStatus::Processing, "summarizing evidence", 80);
        let summarized_web = self.summarize_web_results().await;
        let summarized_local = self.summarize_local_results().await;

        self.emit(SessionStatus::Processing, "writing final report", 90);
        let prompt = self.build_final_prompt(&summarized_web, &summarized_local);
        let final_answer = match self.deps.llm.generate_final_answer(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                self.emit(SessionStatus::Failed, &e.to_string(), 100);
                return Err(e.context("final answer generation failed"));
            }
        };

        self.emit(SessionStatus::Completed, "session complete", 100);
        Ok(final_answer)
    }

    /// Score every candidate against the enhanced-query embedding and draw
    /// a weighted sample. Candidates that fail to embed are dropped from
    /// the draw; an entirely failed round keeps the original list.
    async fn monte_carlo_subqueries(&mut self, subqueries: Vec<String>) -> Vec<String> {
        let mut scored: Vec<(String, f32)> = Vec::new();
        for sq in &subqueries {
            let sq_clean = clean_search_query(sq);
            if sq_clean.is_empty() {
                continue;
            }
            match embed_blocking(Arc::clone(&self.deps.embedder), sq_clean.clone()).await {
                Ok(emb) => {
                    let score = late_interaction_score(&self.enhanced_query_embedding, &emb);
                    scored.push((sq_clean, score));
                }
                Err(e) => warn!("embedding sub-query failed: {}", e),
            }
        }

        if scored.is_empty() {
            warn!("no valid sub-queries for Monte Carlo; keeping original list");
            return subqueries;
        }

        let outcome = monte_carlo::sample_subqueries(
            &mut self.rng,
            &scored,
            self.config.monte_carlo_samples,
        );
        info!("monte carlo selected: {:?}", outcome.selected);
        let selected = outcome.selected.clone();
        self.monte_carlo = Some(outcome);
        selected
    }

    /// Depth-limited recursive expansion. One sub-query → one TOC node,
    /// unless the relevance gate prunes the branch before any network work.
    fn expand(
        &mut self,
        subqueries: Vec<String>,
        depth: usize,
        parent_query: Option<String>,
    ) -> BoxFuture<'_, Result<Expansion>> {
        async move {
            let mut aggregated = Expansion {
                web_results: Vec::new(),
                corpus_entries: Vec::new(),
                toc_nodes: Vec::new(),
            };

            for sq in subqueries {
                let sq_clean = clean_search_query(&sq);
                if sq_clean.is_empty() {
                    continue;
                }

                let mut node = TocNode::new(&sq_clean, depth);
                node.parent_query =
                    Some(parent_query.clone().unwrap_or_else(|| self.query.clone()));

                let node_emb = match embed_blocking(
                    Arc::clone(&self.deps.embedder),
                    sq_clean.clone(),
                )
                .await
                {
                    Ok(emb) => emb,
                    Err(e) => {
                        warn!("embedding '{}' failed: {}; dropping branch", sq_clean, e);
                        continue;
                    }
                };
                let relevance = late_interaction_score(&self.enhanced_query_embedding, &node_emb);
                node.relevance_score = relevance;
                node.add_similarity_score(relevance);

                if let Some(mc) = &self.monte_carlo {
                    if mc.is_selected(&sq_clean) {
                        node.metrics.monte_carlo_selected = true;
                        node.metrics.monte_carlo_weight = mc.weight_of(&sq_clean);
                    }
                }

                if relevance < self.config.min_relevance {
                    info!(
                        "skipping branch '{}': relevance {:.2} < {:.2}",
                        sq_clean, relevance, self.config.min_relevance
                    );
                    continue;
                }

                let (mut branch_web, mut branch_entries) =
                    self.search_branch(&mut node, &sq_clean).await;

                // Summarize what the branch found, off the snippet text.
                let branch_snippets: String = branch_web
                    .iter()
                    .map(|r| r.snippet.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let summary_start = Instant::now();
                node.summary = self.deps.llm.summarize_text(&branch_snippets).await;
                node.timestamps.summary_generated = Some(now_iso());
                node.metrics.processing_time_ms += summary_start.elapsed().as_millis() as u64;

                node.web_results = branch_web.clone();
                node.corpus_entries = branch_entries.clone();
                node.metrics.web_results_count = branch_web.len();
                node.metrics.corpus_entries_count = branch_entries.len();
                node.metrics.total_content_length =
                    branch_web.iter().map(|r| r.snippet.len()).sum();

                // Deepen: enhance this sub-query and recurse on the result.
                if depth < self.deps.max_depth {
                    let additional_query = self.deps.llm.enhance_query(&sq_clean).await;
                    if !additional_query.trim().is_empty() && additional_query != sq_clean {
                        let additional =
                            split_query(&additional_query, self.config.max_query_length);
                        if !additional.is_empty() {
                            node.metrics.subquery_expansion_count = additional.len();
                            let deeper = self
                                .expand(additional, depth + 1, Some(sq_clean.clone()))
                                .await?;
                            branch_web.extend(deeper.web_results);
                            branch_entries.extend(deeper.corpus_entries);
                            for child in deeper.toc_nodes {
                                node.add_child(child);
                            }
                        }
                    }
                }

                node.timestamps.completed = Some(now_iso());
                aggregated.web_results.append(&mut branch_web);
                aggregated.corpus_entries.append(&mut branch_entries);
                aggregated.toc_nodes.push(node);
            }

            Ok(aggregated)
        }
        .boxed()
    }

    /// Search → rerank → download → extract → embed for one branch.
    /// Every per-page failure drops that page and nothing else.
    async fn search_branch(
        &mut self,
        node: &mut TocNode,
        sq_clean: &str,
    ) -> (Vec<WebResult>, Vec<CorpusEntry>) {
        let safe_subquery: String = sanitize_filename(sq_clean).chars().take(30).collect();
        let subquery_dir = self.base_result_dir.join(format!("web_{}", safe_subquery));
        debug!(
            "searching web for '{}' at depth={}",
            sq_clean, node.depth
        );

        node.timestamps.web_search_start = Some(now_iso());
        let search_start = Instant::now();

        let raw = self.deps.engines.search(sq_clean, 30).await;
        let ranked = rerank(raw, sq_clean, 3);
        let top: Vec<SearchResult> = ranked
            .into_iter()
            .take(self.config.web_search_limit)
            .collect();
        let urls: Vec<String> = top.iter().map(|r| r.href.clone()).collect();

        let pages = self.deps.fetcher.download(&urls, &subquery_dir).await;

        node.timestamps.web_search_end = Some(now_iso());
        node.metrics.processing_time_ms += search_start.elapsed().as_millis() as u64;

        let result_by_url: HashMap<&str, &SearchResult> =
            top.iter().map(|r| (r.href.as_str(), r)).collect();

        let mut branch_web = Vec::new();
        let mut branch_entries = Vec::new();

        for page in pages {
            let Some(result) = result_by_url.get(page.url.as_str()).copied().cloned() else {
                continue;
            };

            let path = PathBuf::from(&page.file_path);
            let text = tokio::task::spawn_blocking(move || extract::parse_any_to_text(&path))
                .await
                .unwrap_or_default();
            if text.trim().is_empty() {
                debug!("no text recovered from {}", page.url);
                continue;
            }

            let preview = format!("{}…", truncate_chars(&text, 800));
            if let Err(e) = crawl::write_sidecar(&page, &result, sq_clean, &preview) {
                warn!("sidecar write failed for {}: {}", page.url, e);
            }

            let limited = truncate_chars(&text, 2048);
            let embedding =
                match embed_blocking(Arc::clone(&self.deps.embedder), limited).await {
                    Ok(emb) => emb,
                    Err(e) => {
                        warn!("embedding page '{}' failed: {}", page.url, e);
                        continue;
                    }
                };

            let snippet_short = format!("{}...", truncate_chars(&text, 100).replace('\n', " "));
            branch_entries.push(CorpusEntry {
                embedding,
                metadata: EntryMetadata {
                    file_path: page.file_path.clone(),
                    kind: EntryKind::WebHtml,
                    snippet: snippet_short,
                    url: Some(page.url.clone()),
                    source_engine: Some(result.source.clone()),
                    content_type: Some(page.content_type.clone()),
                    size: Some(page.size),
                    published_hint: result.published.clone(),
                    downloaded_at: Some(now_iso()),
                },
            });
            branch_web.push(WebResult {
                url: page.url.clone(),
                snippet: preview,
                title: result.title.clone(),
                source_engine: result.source.clone(),
            });
            self.pages_by_url.insert(page.url.clone(), page);
        }

        (branch_web, branch_entries)
    }

    async fn summarize_web_results(&mut self) -> String {
        let mut lines = Vec::new();
        let mut seen = std::collections::HashSet::new();
        self.reference_links.clear();
        for w in &self.web_results {
            lines.push(format!(
                "URL: {} - Title: {} - Source: {} - snippet: {}",
                w.url, w.title, w.source_engine, w.snippet
            ));
            if seen.insert(w.url.clone()) {
                self.reference_links.push(w.url.clone());
            }
        }
        self.deps.llm.summarize_text(&lines.join("\n")).await
    }

    async fn summarize_local_results(&self) -> String {
        let lines: Vec<String> = self
            .local_results
            .iter()
            .map(|doc| {
                format!(
                    "File: {} snippet: {}",
                    doc.metadata.file_path, doc.metadata.snippet
                )
            })
            .collect();
        self.deps.llm.summarize_text(&lines.join("\n")).await
    }

    fn build_final_prompt(&self, summarized_web: &str, summarized_local: &str) -> String {
        let toc_str = if self.toc_tree.is_empty() {
            "No TOC available.".to_string()
        } else {
            build_toc_string(&self.toc_tree)
        };
        let reference_links: String = self
            .reference_links
            .iter()
            .map(|link| format!("- {}", link))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are an expert research analyst. Using all of the data provided below, produce a comprehensive, advanced report of at least 3000 words on the topic.\n\
             The report should include:\n\
             1) A detailed Table of Contents (based on the search branches),\n\
             2) Multiple sections,\n\
             3) In-depth analysis with citations,\n\
             4) A final reference section listing all relevant URLs.\n\n\
             User Query: {}\n\n\
             Table of Contents:\n{}\n\n\
             Summarized Web Results:\n{}\n\n\
             Summarized Local Document Results:\n{}\n\n\
             Reference Links (unique URLs found):\n{}\n\n\
             Provide a thorough discussion covering background, current findings, challenges, and future directions.\n\
             Write the report in clear Markdown with section headings, subheadings, and references.\n\n\
             Report:\n",
            self.enhanced_query, toc_str, summarized_web, summarized_local, reference_links
        )
    }

    /// Persist the TOC JSON and the aggregated markdown report; returns the
    /// report path.
    pub fn save_report(&self, final_answer: &str) -> Result<PathBuf> {
        info!("saving final report for query_id={}", self.query_id);

        if !self.toc_tree.is_empty() {
            let toc_path = self.base_result_dir.join("toc_analysis.json");
            if let Err(e) = save_toc_to_json(&self.toc_tree, &toc_path) {
                warn!("failed to save TOC JSON: {}", e);
            } else {
                info!("TOC analysis saved to {}", toc_path.display());
            }
        }

        report::aggregate_results(
            &self.base_result_dir,
            &self.query_id,
            &self.enhanced_query,
            &self.web_results,
            &self.local_results,
            &self.grouped_web_results,
            final_answer,
        )
    }

    /// Package the session in the shape external wrappers consume.
    pub fn outcome(
        &self,
        final_answer: Option<String>,
        error_message: Option<String>,
    ) -> SessionOutcome {
        let status = if error_message.is_some() {
            SessionStatus::Failed
        } else if final_answer.is_some() {
            SessionStatus::Completed
        } else {
            SessionStatus::Processing
        };
        let completed = matches!(status, SessionStatus::Completed | SessionStatus::Failed);

        SessionOutcome {
            query_id: self.query_id.clone(),
            status,
            query_text: self.query.clone(),
            parameters: serde_json::json!({
                "max_depth": self.deps.max_depth,
                "top_k": self.deps.top_k,
                "web_search_enabled": self.deps.web_search_enabled,
                "monte_carlo_search": self.config.monte_carlo_search,
                "min_relevance": self.config.min_relevance,
                "web_search_limit": self.config.web_search_limit,
            }),
            final_answer,
            search_tree: serde_json::Value::Array(
                self.toc_tree.iter().map(|n| n.to_json()).collect(),
            ),
            web_results: self.web_results.clone(),
            local_results: self
                .local_results
                .iter()
                .map(|e| serde_json::to_value(&e.metadata).unwrap_or_default())
                .collect(),
            error_message,
            created_at: self.created_at,
            completed_at: completed.then(chrono::Utc::now),
            processing_time_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}
