use crate::embed::kb::CorpusEntry;
use crate::types::WebResult;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Lifecycle timestamps for one search-tree branch (ISO-8601 strings, as
/// persisted in the TOC JSON).
#[derive(Debug, Serialize, Clone, Default)]
pub struct NodeTimestamps {
    pub created: Option<String>,
    pub web_search_start: Option<String>,
    pub web_search_end: Option<String>,
    pub summary_generated: Option<String>,
    pub completed: Option<String>,
}

/// Per-node accounting used by the analytics block and by debugging.
#[derive(Debug, Serialize, Clone, Default)]
pub struct NodeMetrics {
    pub web_results_count: usize,
    pub corpus_entries_count: usize,
    pub total_content_length: usize,
    pub avg_similarity_score: f32,
    pub max_similarity_score: f32,
    pub min_similarity_score: f32,
    pub monte_carlo_selected: bool,
    pub monte_carlo_weight: f32,
    pub processing_time_ms: u64,
    pub subquery_expansion_count: usize,
}

/// One branch of the search tree. Children are owned; the parent link is
/// the parent's query text, which keeps the tree a plain value type.
#[derive(Debug, Clone)]
pub struct TocNode {
    pub node_id: String,
    pub query_text: String,
    pub depth: usize,
    pub parent_query: Option<String>,
    pub relevance_score: f32,
    pub summary: String,
    pub web_results: Vec<WebResult>,
    pub corpus_entries: Vec<CorpusEntry>,
    pub children: Vec<TocNode>,
    pub timestamps: NodeTimestamps,
    pub metrics: NodeMetrics,
    pub similarity_scores: Vec<f32>,
}

impl TocNode {
    pub fn new(query_text: &str, depth: usize) -> Self {
        Self {
            node_id: short_id(),
            query_text: query_text.to_string(),
            depth,
            parent_query: None,
            relevance_score: 0.0,
            summary: String::new(),
            web_results: Vec::new(),
            corpus_entries: Vec::new(),
            children: Vec::new(),
            timestamps: NodeTimestamps {
                created: Some(now_iso()),
                ..Default::default()
            },
            metrics: NodeMetrics::default(),
            similarity_scores: Vec::new(),
        }
    }

    /// Attach a child, recording this node's query as its parent context.
    pub fn add_child(&mut self, mut child: TocNode) {
        child.parent_query = Some(self.query_text.clone());
        self.children.push(child);
    }

    /// Record a similarity measurement and refresh the running stats.
    pub fn add_similarity_score(&mut self, score: f32) {
        self.similarity_scores.push(score);
        let n = self.similarity_scores.len() as f32;
        self.metrics.avg_similarity_score = self.similarity_scores.iter().sum::<f32>() / n;
        self.metrics.max_similarity_score = self
            .similarity_scores
            .iter()
            .cloned()
            .fold(f32::MIN, f32::max);
        self.metrics.min_similarity_score = self
            .similarity_scores
            .iter()
            .cloned()
            .fold(f32::MAX, f32::min);
    }

    /// JSON shape used in `toc_analysis.json`; corpus entries are counted,
    /// not inlined.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "node_id": self.node_id,
            "query_text": self.query_text,
            "depth": self.depth,
            "summary": self.summary,
            "relevance_score": self.relevance_score,
            "timestamps": self.timestamps,
            "metrics": self.metrics,
            "similarity_scores": self.similarity_scores,
            "parent_query": self.parent_query,
            "web_results_count": self.web_results.len(),
            "corpus_entries_count": self.corpus_entries.len(),
            "children_count": self.children.len(),
            "children": self.children.iter().map(|c| c.to_json()).collect::<Vec<_>>(),
        })
    }
}

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Indented bullet rendering of the tree for the final aggregation prompt.
pub fn build_toc_string(nodes: &[TocNode]) -> String {
    fn walk(nodes: &[TocNode], indent: usize, out: &mut String) {
        for node in nodes {
            let summary_snippet = if node.summary.is_empty() {
                "No summary".to_string()
            } else {
                let short: String = node.summary.chars().take(150).collect();
                format!("{}...", short)
            };
            out.push_str(&format!(
                "{}- {} (Relevance: {:.2}, Summary: {})\n",
                "  ".repeat(indent),
                node.query_text,
                node.relevance_score,
                summary_snippet
            ));
            walk(&node.children, indent + 1, out);
        }
    }

    let mut out = String::new();
    walk(nodes, 0, &mut out);
    out
}

#[derive(Debug, Serialize)]
pub struct TocAnalytics {
    pub tree_structure: TreeStructureStats,
    pub relevance_metrics: RelevanceStats,
    pub monte_carlo_metrics: MonteCarloStats,
    pub content_metrics: ContentStats,
    pub timing_metrics: TimingStats,
    pub similarity_metrics: Option<SimilarityStats>,
    pub generated_at: String,
}

#[derive(Debug, Serialize)]
pub struct TreeStructureStats {
    pub total_nodes: usize,
    pub max_depth: usize,
    pub avg_depth: f64,
    pub nodes_with_children: usize,
    pub avg_branching_factor: f64,
}

#[derive(Debug, Serialize)]
pub struct RelevanceStats {
    pub avg_relevance: f64,
    pub max_relevance: f64,
    pub min_relevance: f64,
    pub relevance_std: f64,
}

#[derive(Debug, Serialize)]
pub struct MonteCarloStats {
    pub selected_nodes: usize,
    pub selection_percentage: f64,
    pub total_candidates: usize,
}

#[derive(Debug, Serialize)]
pub struct ContentStats {
    pub total_web_results: usize,
    pub total_corpus_entries: usize,
    pub total_content_length: usize,
    pub avg_web_results_per_node: f64,
}

#[derive(Debug, Serialize)]
pub struct TimingStats {
    pub total_processing_time_ms: u64,
    pub avg_processing_time_ms: f64,
    pub max_processing_time_ms: u64,
    pub min_processing_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SimilarityStats {
    pub avg_similarity: f64,
    pub max_similarity: f64,
    pub min_similarity: f64,
    pub total_similarity_measurements: usize,
}

fn collect_all<'a>(nodes: &'a [TocNode], out: &mut Vec<&'a TocNode>) {
    for node in nodes {
        out.push(node);
        collect_all(&node.children, out);
    }
}

/// Walk the tree and compute the analytics block for `toc_analysis.json`.
pub fn analyze_toc_tree(nodes: &[TocNode]) -> Option<TocAnalytics> {
    let mut all = Vec::new();
    collect_all(nodes, &mut all);
    if all.is_empty() {
        return None;
    }

    let total = all.len();
    let max_depth = all.iter().map(|n| n.depth).max().unwrap_or(0);
    let avg_depth = all.iter().map(|n| n.depth).sum::<usize>() as f64 / total as f64;

    let relevance: Vec<f64> = all.iter().map(|n| n.relevance_score as f64).collect();
    let avg_relevance = relevance.iter().sum::<f64>() / total as f64;
    let relevance_std = (relevance
        .iter()
        .map(|x| (x - avg_relevance).powi(2))
        .sum::<f64>()
        / total as f64)
        .sqrt();

    let selected = all.iter().filter(|n| n.metrics.monte_carlo_selected).count();

    let with_children: Vec<&&TocNode> = all.iter().filter(|n| !n.children.is_empty()).collect();
    let avg_branching = if with_children.is_empty() {
        0.0
    } else {
        with_children.iter().map(|n| n.children.len()).sum::<usize>() as f64
            / with_children.len() as f64
    };

    let times: Vec<u64> = all.iter().map(|n| n.metrics.processing_time_ms).collect();
    let total_time: u64 = times.iter().sum();

    let all_sims: Vec<f64> = all
        .iter()
        .flat_map(|n| n.similarity_scores.iter().map(|s| *s as f64))
        .collect();
    let similarity_metrics = if all_sims.is_empty() {
        None
    } else {
        Some(SimilarityStats {
            avg_similarity: all_sims.iter().sum::<f64>() / all_sims.len() as f64,
            max_similarity: all_sims.iter().cloned().fold(f64::MIN, f64::max),
            min_similarity: all_sims.iter().cloned().fold(f64::MAX, f64::min),
            total_similarity_measurements: all_sims.len(),
        })
    };

    Some(TocAnalytics {
        tree_structure: TreeStructureStats {
            total_nodes: total,
            max_depth,
            avg_depth,
            nodes_with_children: with_children.len(),
            avg_branching_factor: avg_branching,
        },
        relevance_metrics: RelevanceStats {
            avg_relevance,
            max_relevance: relevance.iter().cloned().fold(f64::MIN, f64::max),
            min_relevance: relevance.iter().cloned().fold(f64::MAX, f64::min),
            relevance_std,
        },
        monte_carlo_metrics: MonteCarloStats {
            selected_nodes: selected,
            selection_percentage: selected as f64 / total as f64 * 100.0,
            total_candidates: total,
        },
        content_metrics: ContentStats {
            total_web_results: all.iter().map(|n| n.metrics.web_results_count).sum(),
            total_corpus_entries: all.iter().map(|n| n.metrics.corpus_entries_count).sum(),
            total_content_length: all.iter().map(|n| n.metrics.total_content_length).sum(),
            avg_web_results_per_node: all
                .iter()
                .map(|n| n.metrics.web_results_count)
                .sum::<usize>() as f64
                / total as f64,
        },
        timing_metrics: TimingStats {
            total_processing_time_ms: total_time,
            avg_processing_time_ms: total_time as f64 / total as f64,
            max_processing_time_ms: times.iter().cloned().max().unwrap_or(0),
            min_processing_time_ms: times.iter().cloned().min().unwrap_or(0),
        },
        similarity_metrics,
        generated_at: now_iso(),
    })
}

/// Persist the search tree plus analytics to `toc_analysis.json`.
pub fn save_toc_to_json(nodes: &[TocNode], output_path: &Path) -> Result<()> {
    let doc = serde_json::json!({
        "toc_tree": nodes.iter().map(|n| n.to_json()).collect::<Vec<_>>(),
        "metadata": {
            "total_nodes": nodes.len(),
            "exported_at": now_iso(),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "analytics": analyze_toc_tree(nodes),
    });

    let json = serde_json::to_string_pretty(&doc).context("serializing TOC tree")?;
    std::fs::write(output_path, json)
        .with_context(|| format!("writing {}", output_path.display()))?;
    Ok(())
}
