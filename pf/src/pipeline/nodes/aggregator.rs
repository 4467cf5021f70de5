//! Aggregator - assembles the final document and its summary
//!
//! Never fails. Each of its two model calls has a deterministic fallback, and
//! degradation is reported as a warning instead of an error.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::llm::CompletionRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::node::{Node, NodeContext, NodeId};
use crate::pipeline::state::{PipelineState, PlanSection, ProjectCategory, StateUpdate};

/// Plain concatenation of the sections in generation order
pub fn concatenate_sections(sections: &[PlanSection]) -> String {
    let mut ordered: Vec<&PlanSection> = sections.iter().collect();
    ordered.sort_by_key(|s| s.order);

    let mut document = String::from("# Project Plan\n");
    for section in ordered {
        document.push_str(&format!("\n## {}\n\n{}\n", section.title, section.content.trim()));
    }
    document
}

/// One-line summary built from classification alone
pub fn template_summary(state: &PipelineState) -> String {
    let category = state.project_category.unwrap_or(ProjectCategory::General).label();
    let stack = state.tech_stack();
    let count = state.plan_sections.len();
    let noun = if count == 1 { "section" } else { "sections" };
    if stack.is_empty() {
        format!("A {} {category} project plan with {count} {noun}.", state.complexity())
    } else {
        format!(
            "A {} {category} project plan using {} with {count} {noun}.",
            state.complexity(),
            stack.join(", ")
        )
    }
}

pub struct Aggregator;

impl Aggregator {
    async fn polish(&self, draft: &str, state: &PipelineState, ctx: &NodeContext) -> Result<(String, u64, String), PipelineError> {
        let system = ctx.render(
            "aggregate",
            &json!({
                "category": state.project_category.unwrap_or(ProjectCategory::General).label(),
                "section_count": state.plan_sections.len(),
            }),
        )?;
        let request = CompletionRequest::new("aggregate", system, draft)
            .with_max_tokens(ctx.config.aggregator.max_tokens)
            .with_temperature(ctx.config.analysis_temperature);
        let response = ctx.complete(request).await?;
        let content = response.content.trim().to_string();
        if content.is_empty() {
            return Err(PipelineError::EmptyResponse("document".to_string()));
        }
        Ok((content, response.tokens_used(), response.model))
    }
}

#[async_trait]
impl Node for Aggregator {
    fn id(&self) -> NodeId {
        NodeId::Aggregator
    }

    async fn execute(&self, state: &PipelineState, ctx: &NodeContext) -> Result<StateUpdate, PipelineError> {
        debug!(run_id = %state.run_id, sections = state.plan_sections.len(), "Aggregator::execute: called");
        let mut update = StateUpdate::empty();
        if state.plan_sections.is_empty() {
            warn!(run_id = %state.run_id, "Aggregator: nothing to aggregate");
            update.warning = Some("aggregation skipped: no sections were generated".to_string());
            return Ok(update);
        }

        let mut degraded = Vec::new();
        let draft = concatenate_sections(&state.plan_sections);

        let document = match self.polish(&draft, state, ctx).await {
            Ok((document, tokens, model)) => {
                update.record_usage(tokens, Some(model));
                document
            }
            Err(e) => {
                warn!(run_id = %state.run_id, error = %e, "Aggregator: polish failed, using concatenation");
                degraded.push(format!("document polish failed ({e})"));
                draft
            }
        };

        let aggregator = &ctx.config.aggregator;
        let summary = match ctx
            .summarizer
            .summarize_document(&document, aggregator.summary_max_tokens, aggregator.summary_input_tokens)
            .await
        {
            Some(summary) => {
                update.record_usage(summary.tokens_used, summary.model);
                summary.text
            }
            None => {
                warn!(run_id = %state.run_id, "Aggregator: summary failed, using template");
                degraded.push("summary generation failed".to_string());
                template_summary(state)
            }
        };

        info!(
            run_id = %state.run_id,
            chars = document.len(),
            degraded = !degraded.is_empty(),
            "Aggregator: final plan assembled"
        );
        if !degraded.is_empty() {
            update.warning = Some(format!("aggregation degraded: {}", degraded.join("; ")));
        }
        update.final_plan = Some(document);
        update.plan_summary = Some(summary);
        Ok(update)
    }
}
