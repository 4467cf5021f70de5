//! Node contract and the plumbing every node shares

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::PipelineError;
use super::state::{PipelineState, StateUpdate};
use crate::config::PipelineConfig;
use crate::context::ContextSummarizer;
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, Message};
use crate::parser::{Parsed, parse_json};
use crate::prompts::PromptLoader;

/// Closed set of pipeline steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    IntentAnalyzer,
    Clarifier,
    Classifier,
    SectionPlanner,
    SectionGenerator,
    Aggregator,
    RetryCoordinator,
}

impl NodeId {
    pub const ALL: [NodeId; 7] = [
        NodeId::IntentAnalyzer,
        NodeId::Clarifier,
        NodeId::Classifier,
        NodeId::SectionPlanner,
        NodeId::SectionGenerator,
        NodeId::Aggregator,
        NodeId::RetryCoordinator,
    ];

    /// Stable stage name, as reported in `failedNode`
    pub fn name(&self) -> &'static str {
        match self {
            NodeId::IntentAnalyzer => "initial_analysis",
            NodeId::Clarifier => "clarification",
            NodeId::Classifier => "classification",
            NodeId::SectionPlanner => "section_planning",
            NodeId::SectionGenerator => "section_generation",
            NodeId::Aggregator => "aggregation",
            NodeId::RetryCoordinator => "retry",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Collaborators injected into every node
pub struct NodeContext {
    pub llm: Arc<dyn LlmClient>,
    pub summarizer: Arc<ContextSummarizer>,
    pub prompts: Arc<PromptLoader>,
    pub config: Arc<PipelineConfig>,
}

/// A parsed model answer and what it cost
#[derive(Debug)]
pub struct Structured<T> {
    pub parsed: Parsed<T>,
    pub tokens_used: u64,
    pub model: Option<String>,
}

impl<T> Structured<T> {
    /// Add this call's usage to `update`
    pub fn record_usage(&self, update: &mut StateUpdate) {
        update.record_usage(self.tokens_used, self.model.clone());
    }
}

impl NodeContext {
    /// Context with embedded prompts and a summariser over the same client
    pub fn new(llm: Arc<dyn LlmClient>, config: PipelineConfig) -> Self {
        Self::with_prompts(llm, config, Arc::new(PromptLoader::embedded_only()))
    }

    pub fn with_prompts(llm: Arc<dyn LlmClient>, config: PipelineConfig, prompts: Arc<PromptLoader>) -> Self {
        debug!("NodeContext::with_prompts: called");
        let summarizer =
            Arc::new(ContextSummarizer::new(llm.clone(), config.context.clone()).with_prompts(prompts.clone()));
        Self {
            llm,
            summarizer,
            prompts,
            config: Arc::new(config),
        }
    }

    /// Render a prompt template
    pub fn render(&self, template: &str, context: &impl Serialize) -> Result<String, PipelineError> {
        Ok(self.prompts.render(template, context)?)
    }

    /// One model call; errors surface as node failures
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, PipelineError> {
        debug!(label = %request.label, max_tokens = request.max_tokens, "NodeContext::complete: called");
        Ok(self.llm.complete(request).await?)
    }

    /// Ask for JSON, re-asking on malformed output before settling for `fallback`
    ///
    /// Model errors propagate; parse errors never do.
    pub async fn ask_structured<T: DeserializeOwned>(
        &self,
        request: CompletionRequest,
        fallback: impl FnOnce() -> T,
    ) -> Result<Structured<T>, PipelineError> {
        let label = request.label.clone();
        debug!(%label, parse_retries = self.config.parse_retries, "NodeContext::ask_structured: called");

        let mut request = request;
        let mut tokens_used = 0;
        let mut model = None;
        let mut reason = String::new();

        for attempt in 0..=self.config.parse_retries {
            let response = self.complete(request.clone()).await?;
            tokens_used += response.tokens_used();
            model = Some(response.model.clone());

            match parse_json::<T>(&response.content) {
                Ok(value) => {
                    debug!(%label, attempt, "ask_structured: parsed");
                    return Ok(Structured {
                        parsed: Parsed::Ok(value),
                        tokens_used,
                        model,
                    });
                }
                Err(e) => {
                    warn!(%label, attempt, error = %e, "ask_structured: unparseable response");
                    reason = e.to_string();
                    request.messages.push(Message::assistant(response.content));
                    request.messages.push(Message::user(format!(
                        "That reply could not be parsed ({e}). Respond again with only the JSON, no prose."
                    )));
                }
            }
        }

        warn!(%label, %reason, "ask_structured: using fallback");
        Ok(Structured {
            parsed: Parsed::Fallback {
                value: fallback(),
                reason,
            },
            tokens_used,
            model,
        })
    }
}

/// One step of the pipeline
///
/// Nodes read an immutable snapshot of the state and return only their delta.
/// `execute` may fail; `run` turns a failure into state the retry coordinator
/// can act on, so nothing is raised past the node boundary.
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    async fn execute(&self, state: &PipelineState, ctx: &NodeContext) -> Result<StateUpdate, PipelineError>;

    async fn run(&self, state: &PipelineState, ctx: &NodeContext) -> StateUpdate {
        match self.execute(state, ctx).await {
            Ok(update) => update,
            Err(e) => {
                warn!(node = %self.id(), error = %e, retryable = e.is_retryable(), "Node::run: node failed");
                StateUpdate::failed(self.id(), e.to_string(), e.is_retryable())
            }
        }
    }
}
