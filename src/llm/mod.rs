pub mod anthropic;
pub mod ollama;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// One language-model back-end. Providers are plain HTTP clients; nothing
/// here blocks the scheduler.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_name(&self) -> String;

    async fn generate(&self, prompt: &str, system_message: Option<&str>) -> Result<String>;
}

/// Which provider family to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Ollama => "gemma2:2b",
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-sonnet-latest",
        }
    }
}

/// Unified front over the providers: query enhancement, summarization with
/// chunking, and final report generation.
pub struct LlmManager {
    provider: Arc<dyn LlmProvider>,
    personality: Option<String>,
}

/// Chunk threshold for summarization input.
const SUMMARIZE_MAX_CHARS: usize = 6000;

impl LlmManager {
    pub fn new(provider: Arc<dyn LlmProvider>, personality: Option<String>) -> Self {
        Self {
            provider,
            personality,
        }
    }

    /// Build a manager from provider kind + optional model override.
    pub fn from_kind(
        client: reqwest::Client,
        kind: ProviderKind,
        model: Option<String>,
        personality: Option<String>,
    ) -> Result<Self> {
        let model = model.unwrap_or_else(|| kind.default_model().to_string());
        let provider: Arc<dyn LlmProvider> = match kind {
            ProviderKind::Ollama => Arc::new(ollama::OllamaProvider::new(client, model)),
            ProviderKind::OpenAi => Arc::new(openai::OpenAiProvider::from_env(client, model)?),
            ProviderKind::Anthropic => {
                Arc::new(anthropic::AnthropicProvider::from_env(client, model)?)
            }
        };
        Ok(Self::new(provider, personality))
    }

    pub fn provider_info(&self) -> String {
        self.provider.provider_name()
    }

    async fn generate(&self, prompt: &str, system_message: Option<&str>) -> Result<String> {
        let system = match (&self.personality, system_message) {
            (Some(p), Some(s)) => Some(format!("You are a {} assistant.\n\n{}", p, s)),
            (Some(p), None) => Some(format!("You are a {} assistant.", p)),
            (None, Some(s)) => Some(s.to_string()),
            (None, None) => None,
        };
        self.provider.generate(prompt, system.as_deref()).await
    }

    /// Rewrite a query through chain-of-thought enhancement. Any provider
    /// failure degrades to the original query.
    pub async fn enhance_query(&self, query: &str) -> String {
        let prompt = format!(
            "Original Query: {}\n\n\
             Please enhance this query by:\n\
             1. Adding specific context and constraints\n\
             2. Clarifying the scope and objectives\n\
             3. Specifying the desired output format\n\
             4. Including relevant technical details\n\n\
             After your reasoning, output only the final enhanced query on a single line - SHORT AND CONCISE.\n\
             Provide your reasoning, and at the end output the line 'Final Enhanced Query:' followed by the enhanced query.",
            query
        );

        match self.generate(&prompt, None).await {
            Ok(raw) => {
                let enhanced = extract_final_query(&raw);
                if enhanced.is_empty() {
                    query.to_string()
                } else {
                    enhanced
                }
            }
            Err(e) => {
                warn!("query enhancement failed: {}; keeping original", e);
                query.to_string()
            }
        }
    }

    /// Summarize text, chunking inputs beyond the threshold and combining
    /// the per-chunk summaries with a final pass. Failures degrade to an
    /// empty summary.
    pub async fn summarize_text(&self, text: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            return String::new();
        }

        if text.chars().count() <= SUMMARIZE_MAX_CHARS {
            let prompt = format!("Please summarize the following text succinctly:\n\n{}", text);
            return self.generate(&prompt, None).await.unwrap_or_else(|e| {
                warn!("summarization failed: {}", e);
                String::new()
            });
        }

        let chars: Vec<char> = text.chars().collect();
        let chunks: Vec<String> = chars
            .chunks(SUMMARIZE_MAX_CHARS)
            .map(|c| c.iter().collect())
            .collect();

        let mut summaries = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let prompt = format!("Summarize part {}/{}:\n\n{}", i + 1, chunks.len(), chunk);
            match self.generate(&prompt, None).await {
                Ok(s) => summaries.push(s),
                Err(e) => warn!("chunk {}/{} summarization failed: {}", i + 1, chunks.len(), e),
            }
        }

        let combined = summaries.join("\n");
        if combined.chars().count() > SUMMARIZE_MAX_CHARS {
            let prompt = format!(
                "Combine these summaries into one concise summary:\n\n{}",
                combined
            );
            return self.generate(&prompt, None).await.unwrap_or(combined);
        }
        combined
    }

    /// Final report generation. Unlike every other LLM call in the
    /// pipeline, a failure here propagates and fails the session.
    pub async fn generate_final_answer(&self, aggregation_prompt: &str) -> Result<String> {
        info!("final report generation via {}", self.provider_info());
        self.generate(aggregation_prompt, None).await
    }
}

/// Pull the enhanced query out of a chain-of-thought response. Falls back
/// to the whole response, trimmed, when the marker line is absent.
fn extract_final_query(text: &str) -> String {
    for line in text.lines() {
        if let Some(idx) = line.find("Final Enhanced Query:") {
            let rest = &line[idx + "Final Enhanced Query:".len()..];
            let rest = rest.trim();
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    text.trim().to_string()
}
