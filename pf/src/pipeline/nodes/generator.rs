//! Section Generator - writes one planned section per invocation
//!
//! Each run picks the first planned section not yet generated. Results are
//! append-only, so re-entering after a failure just carries on where the loop
//! stopped.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::config::SectionConfig;
use crate::context::{estimate_tokens, preview, truncate_chars};
use crate::llm::CompletionRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::node::{Node, NodeContext, NodeId};
use crate::pipeline::state::{Complexity, PipelineState, PlanSection, ProjectCategory, StateUpdate};

/// Earlier sections as continuity context
///
/// The newest `verbatim_recent` sections are included in full (capped); older
/// ones as one-line previews. Walking newest to oldest, previews stop once the
/// running token count passes the budget, so the oldest are evicted first.
pub fn previous_sections_context(sections: &[PlanSection], config: &SectionConfig) -> String {
    let mut ordered: Vec<&PlanSection> = sections.iter().collect();
    ordered.sort_by_key(|s| s.order);

    let mut blocks = Vec::new();
    let mut used = 0u32;
    for (age, section) in ordered.iter().rev().enumerate() {
        let block = if age < config.verbatim_recent {
            format!("### {}\n{}", section.title, truncate_chars(&section.content, config.verbatim_max_chars))
        } else {
            let block = format!("### {} (excerpt)\n{}", section.title, preview(&section.content, config.preview_chars));
            if used + estimate_tokens(&block) > config.context_token_budget {
                debug!(evicted = ordered.len() - age, "previous_sections_context: budget reached");
                break;
            }
            block
        };
        used += estimate_tokens(&block);
        blocks.push(block);
    }
    blocks.reverse();
    blocks.join("\n\n")
}

/// Output budget: prompt size scaled by complexity, clamped to the configured range
pub fn token_budget(base_tokens: u32, complexity: Complexity, config: &SectionConfig) -> u32 {
    let scaled = (base_tokens as f64 * config.multipliers.for_tier(complexity)).round();
    let scaled = if scaled.is_finite() { scaled.min(u32::MAX as f64) as u32 } else { u32::MAX };
    scaled.max(config.min_output_tokens).min(config.max_output_tokens)
}

/// Drop a leading heading that only repeats the section title
fn strip_title_heading(content: &str, title: &str) -> String {
    let mut lines = content.lines();
    if let Some(first) = lines.next() {
        let heading = first.trim_start_matches('#').trim();
        if first.starts_with('#') && heading.eq_ignore_ascii_case(title.trim()) {
            return lines.collect::<Vec<_>>().join("\n").trim().to_string();
        }
    }
    content.trim().to_string()
}

pub struct SectionGenerator;

#[async_trait]
impl Node for SectionGenerator {
    fn id(&self) -> NodeId {
        NodeId::SectionGenerator
    }

    async fn execute(&self, state: &PipelineState, ctx: &NodeContext) -> Result<StateUpdate, PipelineError> {
        let remaining = state.remaining_sections();
        debug!(run_id = %state.run_id, remaining = remaining.len(), "SectionGenerator::execute: called");
        let Some(spec) = remaining.first() else {
            debug!("SectionGenerator::execute: nothing left to generate");
            return Ok(StateUpdate::empty());
        };

        let config = &ctx.config.sections;
        let total = state.sections.as_ref().map_or(0, Vec::len);
        let position = state.plan_sections.len() + 1;
        let previous = previous_sections_context(&state.plan_sections, config);
        let remaining_titles = remaining[1..].iter().map(|s| s.title.as_str()).collect::<Vec<_>>().join(", ");

        let system = ctx.render(
            "section",
            &json!({
                "project_request": state.user_prompt,
                "category": state.project_category.unwrap_or(ProjectCategory::General).label(),
                "complexity": state.complexity().as_str(),
                "tech_stack": state.tech_stack().join(", "),
                "position": position,
                "total": total,
                "title": spec.title,
                "description": spec.description,
                "intent": spec.intent,
                "remaining_titles": remaining_titles,
                "has_previous": !previous.is_empty(),
                "previous_sections": previous,
            }),
        )?;
        let user = format!("Write the \"{}\" section now.", spec.title);
        let max_tokens = token_budget(
            estimate_tokens(&system) + estimate_tokens(&user),
            state.complexity(),
            config,
        );

        let request = CompletionRequest::new("section", system, user)
            .with_max_tokens(max_tokens)
            .with_temperature(ctx.config.generation_temperature);
        let response = ctx.complete(request).await?;

        let content = strip_title_heading(&response.content, &spec.title);
        if content.is_empty() {
            return Err(PipelineError::EmptyResponse(format!("section '{}'", spec.title)));
        }

        info!(
            run_id = %state.run_id,
            title = %spec.title,
            position,
            total,
            max_tokens,
            chars = content.len(),
            "SectionGenerator: generated section"
        );
        let mut update = StateUpdate::empty();
        update.record_usage(response.tokens_used(), Some(response.model));
        update.plan_section = Some(PlanSection {
            title: spec.title.clone(),
            content,
            order: position as u32,
        });
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::llm::client::mock::MockLlmClient;
    use crate::pipeline::state::SectionSpec;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn plan_section(order: u32, len: usize) -> PlanSection {
        PlanSection {
            title: format!("S{order}"),
            content: format!("content of section {order} {}", "word ".repeat(len)),
            order,
        }
    }

    fn planned_state(titles: &[&str]) -> PipelineState {
        let mut state = PipelineState::new("run", "build a bakery site", vec![], 50, 3);
        state.sections = Some(
            titles
                .iter()
                .map(|t| SectionSpec {
                    title: t.to_string(),
                    description: format!("about {t}"),
                    intent: "inform".to_string(),
                    priority: 5,
                })
                .collect(),
        );
        state
    }

    #[test]
    fn test_previous_context_verbatim_and_previews() {
        let config = SectionConfig::default();
        let sections: Vec<PlanSection> = (1..=4).map(|i| plan_section(i, 100)).collect();
        let context = previous_sections_context(&sections, &config);

        assert!(context.contains("### S4\n"));
        assert!(context.contains("### S3\n"));
        assert!(context.contains("### S2 (excerpt)"));
        assert!(context.contains("### S1 (excerpt)"));
        assert!(context.find("S1").unwrap() < context.find("S4").unwrap());
    }

    #[test]
    fn test_previous_context_evicts_oldest_first() {
        let config = SectionConfig {
            context_token_budget: 200,
            ..SectionConfig::default()
        };
        let sections: Vec<PlanSection> = (1..=6).map(|i| plan_section(i, 200)).collect();
        let context = previous_sections_context(&sections, &config);

        assert!(context.contains("### S6"));
        assert!(context.contains("### S5"));
        assert!(!context.contains("### S1"));
    }

    #[test]
    fn test_previous_context_empty() {
        assert!(previous_sections_context(&[], &SectionConfig::default()).is_empty());
    }

    #[test]
    fn test_token_budget_scales_by_tier() {
        let config = SectionConfig::default();
        assert_eq!(token_budget(1000, Complexity::Simple, &config), 2000);
        assert_eq!(token_budget(1000, Complexity::Moderate, &config), 2500);
        assert_eq!(token_budget(1000, Complexity::Complex, &config), 4000);
        assert_eq!(token_budget(5000, Complexity::Complex, &config), 8000);
    }

    #[test]
    fn test_strip_title_heading() {
        assert_eq!(strip_title_heading("## Overview\n\nBody text", "Overview"), "Body text");
        assert_eq!(strip_title_heading("Body text", "Overview"), "Body text");
        assert_eq!(strip_title_heading("## Other\nBody", "Overview"), "## Other\nBody");
    }

    #[tokio::test]
    async fn test_generates_first_remaining_section() {
        let llm = Arc::new(MockLlmClient::with_handler(|req, _| {
            assert!(req.system_prompt.contains("Section 2 of 3: Menu"));
            assert!(req.system_prompt.contains("### Intro"));
            assert!(req.max_tokens >= 2000 && req.max_tokens <= 8000);
            Ok(MockLlmClient::text("## Menu\nCakes and bread."))
        }));
        let ctx = NodeContext::new(llm, PipelineConfig::default());
        let mut state = planned_state(&["Intro", "Menu", "Contact"]);
        state.plan_sections.push(PlanSection {
            title: "Intro".to_string(),
            content: "Welcome".to_string(),
            order: 1,
        });
        state.generated_sections.insert("Intro".to_string());

        let update = SectionGenerator.execute(&state, &ctx).await.unwrap();
        let section = update.plan_section.unwrap();
        assert_eq!(section.title, "Menu");
        assert_eq!(section.content, "Cakes and bread.");
        assert_eq!(section.order, 2);
        assert_eq!(update.tokens_used, 30);
    }

    #[tokio::test]
    async fn test_noop_when_all_generated() {
        let llm = Arc::new(MockLlmClient::failing());
        let ctx = NodeContext::new(llm.clone(), PipelineConfig::default());
        let mut state = planned_state(&["Intro"]);
        state.generated_sections.insert("Intro".to_string());

        let update = SectionGenerator.execute(&state, &ctx).await.unwrap();
        assert!(update.plan_section.is_none());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_body_is_retryable() {
        let llm = Arc::new(MockLlmClient::with_handler(|_, _| Ok(MockLlmClient::text("## Intro\n   "))));
        let ctx = NodeContext::new(llm, PipelineConfig::default());
        let state = planned_state(&["Intro"]);

        let update = SectionGenerator.run(&state, &ctx).await;
        let failure = update.failure.unwrap();
        assert_eq!(failure.node, NodeId::SectionGenerator);
        assert!(failure.retryable);
        assert!(update.plan_section.is_none());
    }

    proptest! {
        #[test]
        fn prop_token_budget_clamped(base in 0u32..1_000_000, tier in 0usize..3) {
            let config = SectionConfig::default();
            let complexity = [Complexity::Simple, Complexity::Moderate, Complexity::Complex][tier];
            let budget = token_budget(base, complexity, &config);
            prop_assert!(budget >= config.min_output_tokens);
            prop_assert!(budget <= config.max_output_tokens);
        }

        #[test]
        fn prop_token_budget_monotonic(a in 0u32..100_000, b in 0u32..100_000) {
            let config = SectionConfig::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(token_budget(lo, Complexity::Moderate, &config) <= token_budget(hi, Complexity::Moderate, &config));
        }
    }
}
