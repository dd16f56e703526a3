use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One hit from a single search back-end. Immutable once produced.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SearchResult {
    pub title: String,
    pub href: String,
    #[serde(default)]
    pub body: String,
    /// Engine tag: "tavily", "ddg", "searxng", "wikipedia", "brave".
    #[serde(default)]
    pub source: String,
    /// Best-effort publication date hint, as the engine reported it.
    #[serde(default)]
    pub published: Option<String>,
}

/// One successfully downloaded artifact, produced by the fetcher and
/// consumed by the extractor.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub file_path: String,
    pub content_type: String,
    pub size: u64,
}

/// Sidecar JSON written next to each downloaded page, carrying provenance
/// and a short text preview.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PageSidecar {
    pub keyword: String,
    pub source_engine: String,
    pub title: String,
    pub url: String,
    pub file_path: String,
    pub content_type: String,
    pub size: u64,
    /// ISO-8601 Zulu.
    pub downloaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_hint: Option<String>,
    pub text_preview: String,
    pub version: String,
}

/// Lightweight web-result record kept on TOC nodes and in the final report.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebResult {
    pub url: String,
    pub snippet: String,
    pub title: String,
    pub source_engine: String,
}

/// One downloaded page as listed in the per-domain grouping of the report.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DomainPage {
    pub url: String,
    pub file_path: String,
    pub content_type: String,
    pub title: String,
    pub source_engine: String,
}

/// Session lifecycle state, as streamed to external consumers.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One progress event. The session pushes these over an optional channel;
/// the transport (websocket, SSE, log line) is the caller's concern.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProgressUpdate {
    pub query_id: String,
    pub status: SessionStatus,
    pub message: String,
    pub progress_percentage: u8,
    pub timestamp: DateTime<Utc>,
}

/// Final session result in the shape external wrappers consume.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionOutcome {
    pub query_id: String,
    pub status: SessionStatus,
    pub query_text: String,
    pub parameters: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    pub search_tree: serde_json::Value,
    pub web_results: Vec<WebResult>,
    pub local_results: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: u64,
}
