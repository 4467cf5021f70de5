//! Orchestrator - runs one request through the node graph
//!
//! The loop is strictly sequential: run a node, merge its update, ask the
//! router where to go. Before every node it checks the cancellation token and
//! the step budget, so a run always stops with its accumulated state intact.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{PipelineError, RouterError};
use super::node::{Node, NodeContext, NodeId};
use super::nodes::NodeRegistry;
use super::request::PipelineRequest;
use super::response::{HaltReason, PipelineOutcome, PipelineResponse};
use super::router::{Halt, Route, Router, retry_target};
use super::state::PipelineState;
use crate::config::PipelineConfig;
use crate::context::{ContextSummarizer, preview};
use crate::events::{EventBus, EventEmitter};
use crate::llm::LlmClient;
use crate::prompts::PromptLoader;

pub struct Orchestrator {
    nodes: NodeRegistry,
    router: Router,
    ctx: NodeContext,
    events: Option<Arc<EventBus>>,
}

impl Orchestrator {
    /// Standard graph over the given model client
    ///
    /// Rejects a configuration the pipeline cannot run with.
    pub fn new(llm: Arc<dyn LlmClient>, config: PipelineConfig) -> Result<Self, PipelineError> {
        debug!(max_steps = config.max_steps, max_retries = config.max_retries, "Orchestrator::new: called");
        config
            .validate()
            .map_err(|e| PipelineError::Validation(format!("invalid pipeline config: {e}")))?;
        let nodes = NodeRegistry::standard();
        nodes.ensure_complete()?;
        Ok(Self {
            nodes,
            router: Router::standard()?,
            ctx: NodeContext::new(llm, config),
            events: None,
        })
    }

    /// Use a shared prompt loader (project overrides)
    pub fn with_prompts(mut self, prompts: Arc<PromptLoader>) -> Self {
        let config = (*self.ctx.config).clone();
        self.ctx = NodeContext::with_prompts(self.ctx.llm.clone(), config, prompts);
        self
    }

    /// Use a specific summariser instead of one built over the model client
    ///
    /// Call after `with_prompts`, which rebuilds the default summariser.
    pub fn with_summarizer(mut self, summarizer: Arc<ContextSummarizer>) -> Self {
        self.ctx.summarizer = summarizer;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Replace one node implementation
    pub fn with_node(mut self, node: Box<dyn Node>) -> Self {
        self.nodes = self.nodes.with_node(node);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    /// Run a request to completion and shape the response
    ///
    /// Never panics past this point: an unexpected panic inside a node becomes
    /// a structured failure response.
    pub async fn execute(&self, request: PipelineRequest, cancel: CancellationToken) -> PipelineResponse {
        debug!("Orchestrator::execute: called");
        match AssertUnwindSafe(self.run(request, cancel)).catch_unwind().await {
            Ok(outcome) => outcome.to_response(),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(%detail, "Orchestrator::execute: pipeline panicked");
                PipelineResponse::failure(format!("internal error: {detail}"))
            }
        }
    }

    /// Run a request and return the final state with the halt reason
    pub async fn run(&self, request: PipelineRequest, cancel: CancellationToken) -> PipelineOutcome {
        let config = &self.ctx.config;
        let run_id = Uuid::now_v7().to_string();
        debug!(%run_id, "Orchestrator::run: called");

        let emitter = match &self.events {
            Some(bus) => bus.emitter_for(run_id.as_str()),
            None => EventEmitter::detached(run_id.as_str()),
        };

        if let Err(e) = request.validate(config) {
            warn!(%run_id, error = %e, "Orchestrator::run: request rejected");
            let state = PipelineState::new(run_id, request.prompt, request.history, config.max_steps, config.max_retries);
            let halt = HaltReason::Rejected { reason: e.to_string() };
            emitter.run_halted(halt.name(), false, 0, 0);
            return PipelineOutcome { state, halt };
        }

        info!(%run_id, prompt = %preview(&request.prompt, 80), history = request.history.len(), "Orchestrator: run started");
        emitter.run_started(&preview(&request.prompt, 120), request.history.len());

        let mut state = PipelineState::new(
            run_id.as_str(),
            request.prompt,
            request.history,
            config.max_steps,
            config.max_retries,
        );
        let halt = self.drive(&mut state, &emitter, &cancel).await;

        info!(
            %run_id,
            outcome = halt.name(),
            steps = state.step_count,
            retries = state.retry_count,
            sections = state.plan_sections.len(),
            tokens = state.total_tokens_used,
            "Orchestrator: run halted"
        );
        emitter.run_halted(halt.name(), halt.is_success(), state.step_count, state.total_tokens_used);
        PipelineOutcome { state, halt }
    }

    async fn drive(&self, state: &mut PipelineState, emitter: &EventEmitter, cancel: &CancellationToken) -> HaltReason {
        let mut current = NodeId::IntentAnalyzer;
        let mut salvaging = false;

        loop {
            if cancel.is_cancelled() {
                info!(run_id = %state.run_id, node = %current, "drive: cancelled");
                return HaltReason::Cancelled;
            }
            if state.step_budget_exhausted() {
                warn!(run_id = %state.run_id, steps = state.step_count, "drive: step budget exhausted");
                return HaltReason::BudgetExceeded { steps: state.max_steps };
            }
            let Some(node) = self.nodes.get(current) else {
                return HaltReason::Failed {
                    reason: PipelineError::Router(RouterError::MissingNode(current)).to_string(),
                };
            };

            let step = state.step_count;
            debug!(run_id = %state.run_id, node = %current, step, "drive: running node");
            emitter.node_started(current, step);

            let update = node.run(state, &self.ctx).await;
            let failed = update.failure.is_some();
            let tokens = update.tokens_used;
            let backoff = update.backoff;
            let generated_before = state.plan_sections.len();

            state.apply(update);
            emitter.node_completed(current, state.step_count, tokens, failed);

            if state.plan_sections.len() > generated_before
                && let Some(section) = state.plan_sections.last()
            {
                let total = state.sections.as_ref().map_or(0, Vec::len);
                emitter.section_generated(&section.title, section.order, total);
            }

            if let Some(delay) = backoff {
                let target = retry_target(state.failed_node);
                emitter.retry_scheduled(target, state.retry_count, delay.as_millis() as u64, "retrying failed step");
                debug!(run_id = %state.run_id, %target, delay_ms = delay.as_millis() as u64, "drive: backing off");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(run_id = %state.run_id, "drive: cancelled during backoff");
                        return HaltReason::Cancelled;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self.router.next(current, state) {
                Route::Next(next) => {
                    if current == NodeId::RetryCoordinator && next == NodeId::Aggregator {
                        info!(run_id = %state.run_id, sections = state.plan_sections.len(), "drive: salvaging partial plan");
                        salvaging = true;
                    }
                    current = next;
                }
                Route::Halt(Halt::Complete) => return HaltReason::Complete { salvaged: salvaging },
                Route::Halt(Halt::Clarification) => return HaltReason::Clarification,
                Route::Halt(Halt::Failed(reason)) => return HaltReason::Failed { reason },
            }
        }
    }
}
