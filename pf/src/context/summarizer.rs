//! ContextSummarizer - keeps conversation and document context inside budget
//!
//! Recent conversation turns are passed through verbatim; older turns are
//! replaced by their cached summaries, and when the result is still over
//! budget they are compressed with one model call. Every path has a
//! deterministic fallback so a summarisation failure never fails a node.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use super::tokens::{estimate_tokens, preview, truncate_chars, truncate_to_tokens};
use crate::config::ContextConfig;
use crate::llm::{CompletionRequest, LlmClient, Role};
use crate::pipeline::HistoryMessage;
use crate::prompts::PromptLoader;

/// Characters kept per older message when compressing without the model
const FALLBACK_PREVIEW_CHARS: usize = 160;

/// A condensed piece of context and what it cost
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub text: String,
    pub tokens_used: u64,
    pub model: Option<String>,
    /// Produced by the heuristic fallback rather than the model
    pub degraded: bool,
}

impl Summary {
    fn verbatim(text: String) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }
}

/// Summarises conversation history and finished documents
pub struct ContextSummarizer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    config: ContextConfig,
}

impl ContextSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, config: ContextConfig) -> Self {
        debug!(recent = config.recent_messages, budget = config.history_token_budget, "ContextSummarizer::new: called");
        Self {
            llm,
            prompts: Arc::new(PromptLoader::embedded_only()),
            config,
        }
    }

    /// Use a shared prompt loader (for project overrides)
    pub fn with_prompts(mut self, prompts: Arc<PromptLoader>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Conversation history rendered as prompt context
    ///
    /// Returns an empty summary for an empty history.
    pub async fn conversation_context(&self, history: &[HistoryMessage]) -> Summary {
        debug!(len = history.len(), "conversation_context: called");
        if history.is_empty() {
            return Summary::default();
        }

        let split = history.len().saturating_sub(self.config.recent_messages);
        let (older, recent) = history.split_at(split);

        let recent_text = self.transcript(recent, false);
        let older_text = self.transcript(older, true);

        let combined = join_blocks(&older_text, &recent_text);
        if older.is_empty() || estimate_tokens(&combined) <= self.config.history_token_budget {
            debug!(tokens = estimate_tokens(&combined), "conversation_context: within budget");
            return Summary::verbatim(combined);
        }

        debug!(older = older.len(), "conversation_context: over budget, compressing older turns");
        let max_words = self.config.summary_max_tokens * 3 / 4;
        match self.ask("history", max_words, &older_text, self.config.summary_max_tokens).await {
            Some(mut summary) => {
                summary.text = join_blocks(
                    &format!("Earlier conversation (summary): {}", summary.text),
                    &recent_text,
                );
                summary
            }
            None => {
                let budget = self.config.history_token_budget / 2;
                let condensed = older
                    .iter()
                    .map(|m| format!("{}: {}", speaker(m.role), preview(cached_or_content(m), FALLBACK_PREVIEW_CHARS)))
                    .collect::<Vec<_>>()
                    .join("\n");
                Summary {
                    text: join_blocks(
                        &format!("Earlier conversation (condensed):\n{}", truncate_to_tokens(&condensed, budget)),
                        &recent_text,
                    ),
                    degraded: true,
                    ..Summary::default()
                }
            }
        }
    }

    /// Model-written summary of a finished document
    ///
    /// Documents larger than `input_tokens` are truncated before summarising.
    /// Returns `None` when the model fails or answers with nothing.
    pub async fn summarize_document(&self, document: &str, max_tokens: u32, input_tokens: u32) -> Option<Summary> {
        debug!(len = document.len(), max_tokens, input_tokens, "summarize_document: called");
        let input = truncate_to_tokens(document, input_tokens);
        self.ask("summary", max_tokens * 3 / 4, &input, max_tokens).await
    }

    async fn ask(&self, template: &str, max_words: u32, input: &str, max_tokens: u32) -> Option<Summary> {
        let system = match self.prompts.render(template, &json!({ "max_words": max_words })) {
            Ok(system) => system,
            Err(e) => {
                warn!(%template, error = %e, "ContextSummarizer::ask: template failed");
                return None;
            }
        };
        let request = CompletionRequest::new(template, system, input)
            .with_max_tokens(max_tokens)
            .with_temperature(0.2);

        match self.llm.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => Some(Summary {
                text: response.content.trim().to_string(),
                tokens_used: response.tokens_used(),
                model: Some(response.model),
                degraded: false,
            }),
            Ok(_) => {
                warn!(%template, "ContextSummarizer::ask: empty response");
                None
            }
            Err(e) => {
                warn!(%template, error = %e, "ContextSummarizer::ask: model call failed");
                None
            }
        }
    }

    fn transcript(&self, messages: &[HistoryMessage], prefer_summary: bool) -> String {
        messages
            .iter()
            .map(|m| {
                let body = if prefer_summary { cached_or_content(m) } else { &m.content };
                format!("{}: {}", speaker(m.role), truncate_chars(body, self.config.max_message_chars))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn cached_or_content(message: &HistoryMessage) -> &str {
    message
        .summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(&message.content)
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
    }
}

fn join_blocks(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_string(),
        (_, true) => first.to_string(),
        _ => format!("{first}\n\n{second}"),
    }
}
