//! Section Planner - decides which sections this particular document needs
//!
//! The plan is fixed once stored: generation can only shrink the set of
//! remaining sections, which bounds the generation loop.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::SectionConfig;
use crate::llm::CompletionRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::node::{Node, NodeContext, NodeId};
use crate::pipeline::state::{PipelineState, ProjectCategory, SectionSpec, StateUpdate};

const DEFAULT_PRIORITY: u8 = 5;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSection {
    pub title: String,
    pub description: String,
    pub intent: String,
    /// Models send numbers, numeric strings or nothing
    pub priority: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SectionsReply {
    Wrapped { sections: Vec<RawSection> },
    Bare(Vec<RawSection>),
}

impl SectionsReply {
    fn into_sections(self) -> Vec<RawSection> {
        match self {
            SectionsReply::Wrapped { sections } | SectionsReply::Bare(sections) => sections,
        }
    }
}

fn priority_of(raw: Option<&Value>) -> u8 {
    let number = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .filter(|n| n.is_finite())
        .map(|n| n.round().clamp(1.0, 10.0) as u8)
        .unwrap_or(DEFAULT_PRIORITY)
}

/// Drop blank and duplicate titles, clamp priorities, cap the count, sort by priority
pub fn normalize_sections(raw: Vec<RawSection>, max_sections: usize) -> Vec<SectionSpec> {
    let mut seen = HashSet::new();
    let mut sections: Vec<SectionSpec> = raw
        .into_iter()
        .filter_map(|r| {
            let title = r.title.trim().to_string();
            if title.is_empty() || !seen.insert(title.to_lowercase()) {
                return None;
            }
            Some(SectionSpec {
                priority: priority_of(r.priority.as_ref()),
                description: r.description.trim().to_string(),
                intent: r.intent.trim().to_string(),
                title,
            })
        })
        .take(max_sections)
        .collect();
    // Stable: equal priorities keep the model's order
    sections.sort_by(|a, b| b.priority.cmp(&a.priority));
    sections
}

/// Single-section plan that still lets the run make progress
pub fn fallback_sections() -> Vec<SectionSpec> {
    vec![SectionSpec {
        title: "Project Overview".to_string(),
        description: "What is being built, for whom, and how it will be delivered".to_string(),
        intent: "Give the reader a complete high-level picture of the project".to_string(),
        priority: 10,
    }]
}

pub struct SectionPlanner;

impl SectionPlanner {
    fn prompt_context(state: &PipelineState, config: &SectionConfig) -> Value {
        json!({
            "category": state.project_category.unwrap_or(ProjectCategory::General).label(),
            "complexity": state.complexity().as_str(),
            "detected_stack": state.detected_tech_stack.iter().cloned().collect::<Vec<_>>().join(", "),
            "suggested_stack": state.suggested_tech_stack.iter().cloned().collect::<Vec<_>>().join(", "),
            "detected_intent": state.detected_intent,
            "min_sections": config.min_sections,
            "max_sections": config.max_sections,
        })
    }
}

#[async_trait]
impl Node for SectionPlanner {
    fn id(&self) -> NodeId {
        NodeId::SectionPlanner
    }

    async fn execute(&self, state: &PipelineState, ctx: &NodeContext) -> Result<StateUpdate, PipelineError> {
        debug!(run_id = %state.run_id, "SectionPlanner::execute: called");
        let mut update = StateUpdate::empty();
        if state.sections.is_some() {
            debug!("SectionPlanner::execute: plan already fixed");
            return Ok(update);
        }

        let config = &ctx.config.sections;
        let system = ctx.render("sections", &Self::prompt_context(state, config))?;
        let request = CompletionRequest::new("sections", system, state.user_prompt.as_str())
            .with_max_tokens(config.planner_max_tokens)
            .with_temperature(ctx.config.analysis_temperature);

        let answer = ctx
            .ask_structured(request, || SectionsReply::Bare(Vec::new()))
            .await?;
        answer.record_usage(&mut update);

        let mut sections = normalize_sections(answer.parsed.into_inner().into_sections(), config.max_sections);
        if sections.is_empty() {
            warn!(run_id = %state.run_id, "SectionPlanner: no usable sections, using fallback plan");
            sections = fallback_sections();
        } else if sections.len() < config.min_sections {
            warn!(count = sections.len(), min = config.min_sections, "SectionPlanner: fewer sections than asked for");
        }

        info!(
            run_id = %state.run_id,
            count = sections.len(),
            titles = ?sections.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
            "SectionPlanner: planned sections"
        );
        update.sections = Some(sections);
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::llm::client::mock::MockLlmClient;
    use std::sync::Arc;

    fn raw(title: &str, priority: Value) -> RawSection {
        RawSection {
            title: title.to_string(),
            priority: Some(priority),
            ..RawSection::default()
        }
    }

    #[test]
    fn test_normalize_sections() {
        let out = normalize_sections(
            vec![
                raw("Overview", json!(5)),
                raw("  ", json!(9)),
                raw("Architecture", json!("9")),
                raw("overview", json!(10)),
                raw("Risks", json!(42)),
                raw("Timeline", json!(null)),
                raw("Budget", json!(-3)),
            ],
            12,
        );
        let titles: Vec<&str> = out.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Risks", "Architecture", "Overview", "Timeline", "Budget"]);
        let priorities: Vec<u8> = out.iter().map(|s| s.priority).collect();
        assert_eq!(priorities, vec![10, 9, 5, 5, 1]);
    }

    #[test]
    fn test_normalize_caps_count() {
        let many = (0..20).map(|i| raw(&format!("S{i}"), json!(5))).collect();
        assert_eq!(normalize_sections(many, 12).len(), 12);
    }

    #[tokio::test]
    async fn test_plans_sections() {
        let llm = Arc::new(MockLlmClient::new(vec![MockLlmClient::text(
            r#"{"sections": [
                {"title": "Overview", "description": "d", "intent": "i", "priority": 7},
                {"title": "Payments", "description": "d", "intent": "i", "priority": 9}
            ]}"#,
        )]));
        let ctx = NodeContext::new(llm, PipelineConfig::default());
        let state = PipelineState::new("run", "shop", vec![], 50, 3);

        let update = SectionPlanner.execute(&state, &ctx).await.unwrap();
        let sections = update.sections.unwrap();
        assert_eq!(sections[0].title, "Payments");
        assert_eq!(sections[1].title, "Overview");
    }

    #[tokio::test]
    async fn test_unparseable_plan_falls_back() {
        let llm = Arc::new(MockLlmClient::with_handler(|_, _| Ok(MockLlmClient::text("Here are some ideas"))));
        let ctx = NodeContext::new(llm, PipelineConfig::default());
        let state = PipelineState::new("run", "shop", vec![], 50, 3);

        let update = SectionPlanner.execute(&state, &ctx).await.unwrap();
        assert_eq!(update.sections.unwrap(), fallback_sections());
    }

    #[tokio::test]
    async fn test_existing_plan_is_kept() {
        let llm = Arc::new(MockLlmClient::failing());
        let ctx = NodeContext::new(llm.clone(), PipelineConfig::default());
        let mut state = PipelineState::new("run", "shop", vec![], 50, 3);
        state.sections = Some(fallback_sections());

        let update = SectionPlanner.execute(&state, &ctx).await.unwrap();
        assert!(update.sections.is_none());
        assert_eq!(llm.call_count(), 0);
    }
}
