//! Classifier - project category, tech stack and complexity
//!
//! Classification is cache-once: when a category is already present the node
//! returns without calling the model, which makes it a cheap restart point.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::llm::CompletionRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::node::{Node, NodeContext, NodeId};
use crate::pipeline::state::{Complexity, PipelineState, ProjectCategory, StateUpdate};

/// Well-known technologies recognised in the raw prompt: (pattern, canonical name)
const KNOWN_TECH: &[(&str, &str)] = &[
    (r"react\s*native", "React Native"),
    (r"react(?:\.js|js)?", "React"),
    (r"next(?:\.js|js)", "Next.js"),
    (r"vue(?:\.js|js)?", "Vue"),
    (r"angular", "Angular"),
    (r"svelte(?:kit)?", "Svelte"),
    (r"node(?:\.js|js)?", "Node.js"),
    (r"express(?:\.js|js)?", "Express"),
    (r"typescript", "TypeScript"),
    (r"django", "Django"),
    (r"flask", "Flask"),
    (r"fastapi", "FastAPI"),
    (r"ruby\s+on\s+rails|rails", "Ruby on Rails"),
    (r"spring\s*boot", "Spring Boot"),
    (r"laravel", "Laravel"),
    (r"rust", "Rust"),
    (r"golang", "Go"),
    (r"python", "Python"),
    (r"flutter", "Flutter"),
    (r"swift(?:ui)?", "Swift"),
    (r"kotlin", "Kotlin"),
    (r"postgres(?:ql)?", "PostgreSQL"),
    (r"mysql", "MySQL"),
    (r"mongo(?:db)?", "MongoDB"),
    (r"redis", "Redis"),
    (r"sqlite", "SQLite"),
    (r"graphql", "GraphQL"),
    (r"stripe", "Stripe"),
    (r"paypal", "PayPal"),
    (r"firebase", "Firebase"),
    (r"supabase", "Supabase"),
    (r"aws", "AWS"),
    (r"gcp|google\s+cloud", "Google Cloud"),
    (r"azure", "Azure"),
    (r"docker", "Docker"),
    (r"kubernetes|k8s", "Kubernetes"),
    (r"kafka", "Kafka"),
    (r"tailwind(?:\s*css)?", "Tailwind CSS"),
    (r"pytorch", "PyTorch"),
    (r"tensorflow", "TensorFlow"),
    (r"openai", "OpenAI"),
];

static TECH_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    KNOWN_TECH
        .iter()
        .filter_map(|(pattern, name)| {
            Regex::new(&format!(r"(?i)\b(?:{pattern})\b"))
                .map(|re| (re, *name))
                .map_err(|e| warn!(%pattern, error = %e, "TECH_PATTERNS: bad pattern"))
                .ok()
        })
        .collect()
});

/// Technologies named in `text`
pub fn scan_tech_mentions(text: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut rest = text.to_string();
    for (re, name) in TECH_PATTERNS.iter() {
        if re.is_match(&rest) {
            found.insert(name.to_string());
            // "React Native" must not also count as "React"
            rest = re.replace_all(&rest, " ").into_owned();
        }
    }
    debug!(count = found.len(), "scan_tech_mentions: done");
    found
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ClassificationReply {
    category: String,
    detected_tech_stack: Vec<String>,
    suggested_tech_stack: Vec<String>,
    complexity: String,
}

fn clean_stack(items: Vec<String>) -> BTreeSet<String> {
    items
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

pub struct Classifier;

#[async_trait]
impl Node for Classifier {
    fn id(&self) -> NodeId {
        NodeId::Classifier
    }

    async fn execute(&self, state: &PipelineState, ctx: &NodeContext) -> Result<StateUpdate, PipelineError> {
        debug!(run_id = %state.run_id, "Classifier::execute: called");
        let mut update = StateUpdate::empty();
        if let Some(category) = state.project_category {
            debug!(%category, "Classifier::execute: already classified");
            return Ok(update);
        }

        let categories: Vec<&str> = ProjectCategory::ALL.iter().map(|c| c.as_str()).collect();
        let system = ctx.render(
            "classify",
            &json!({
                "categories": categories,
                "detected_intent": state.detected_intent,
            }),
        )?;
        let request = CompletionRequest::new("classify", system, state.user_prompt.as_str())
            .with_max_tokens(ctx.config.intent.max_tokens)
            .with_temperature(ctx.config.analysis_temperature);

        let answer = ctx
            .ask_structured(request, || ClassificationReply {
                category: ProjectCategory::General.as_str().to_string(),
                complexity: Complexity::default().as_str().to_string(),
                ..ClassificationReply::default()
            })
            .await?;
        answer.record_usage(&mut update);

        let fell_back = answer.parsed.is_fallback();
        let reply = answer.parsed.into_inner();

        let category = ProjectCategory::parse_loose(&reply.category).unwrap_or_else(|| {
            warn!(category = %reply.category, "Classifier: unknown category, using general");
            ProjectCategory::General
        });
        let complexity = Complexity::parse_loose(&reply.complexity).unwrap_or_default();

        let mut detected = clean_stack(reply.detected_tech_stack);
        if fell_back {
            detected.extend(scan_tech_mentions(&state.user_prompt));
        }
        let suggested: BTreeSet<String> = clean_stack(reply.suggested_tech_stack)
            .into_iter()
            .filter(|t| !detected.contains(t))
            .collect();

        info!(
            run_id = %state.run_id,
            %category,
            %complexity,
            detected = ?detected,
            fallback = fell_back,
            "Classifier: classified project"
        );
        update.project_category = Some(category);
        update.project_complexity = Some(complexity);
        update.detected_tech_stack = detected;
        update.suggested_tech_stack = suggested;
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::llm::client::mock::MockLlmClient;
    use std::sync::Arc;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scan_tech_mentions() {
        assert_eq!(
            scan_tech_mentions("e-commerce site, Stripe payments, React"),
            set(&["React", "Stripe"])
        );
        assert_eq!(scan_tech_mentions("a React Native app on Firebase"), set(&["Firebase", "React Native"]));
        assert_eq!(scan_tech_mentions("Next.js with postgres"), set(&["Next.js", "PostgreSQL"]));
        assert!(scan_tech_mentions("trust the process").is_empty());
    }

    #[tokio::test]
    async fn test_classifies_from_model() {
        let llm = Arc::new(MockLlmClient::new(vec![MockLlmClient::text(
            r#"```json
{"category": "Web App", "detectedTechStack": ["React", "Stripe"],
 "suggestedTechStack": ["PostgreSQL", "React"], "complexity": "Medium"}
```"#,
        )]));
        let ctx = NodeContext::new(llm, PipelineConfig::default());
        let state = PipelineState::new("run", "e-commerce site, Stripe payments, React", vec![], 50, 3);

        let update = Classifier.execute(&state, &ctx).await.unwrap();
        assert_eq!(update.project_category, Some(ProjectCategory::WebApp));
        assert_eq!(update.project_complexity, Some(Complexity::Moderate));
        assert_eq!(update.detected_tech_stack, set(&["React", "Stripe"]));
        assert_eq!(update.suggested_tech_stack, set(&["PostgreSQL"]));
    }

    #[tokio::test]
    async fn test_fallback_keeps_explicit_mentions() {
        let llm = Arc::new(MockLlmClient::with_handler(|_, _| Ok(MockLlmClient::text("It is a website."))));
        let ctx = NodeContext::new(llm, PipelineConfig::default());
        let state = PipelineState::new("run", "shop on Django with Redis caching", vec![], 50, 3);

        let update = Classifier.execute(&state, &ctx).await.unwrap();
        assert_eq!(update.project_category, Some(ProjectCategory::General));
        assert_eq!(update.project_complexity, Some(Complexity::Moderate));
        assert_eq!(update.detected_tech_stack, set(&["Django", "Redis"]));
    }

    #[tokio::test]
    async fn test_cached_category_skips_model() {
        let llm = Arc::new(MockLlmClient::failing());
        let ctx = NodeContext::new(llm.clone(), PipelineConfig::default());
        let mut state = PipelineState::new("run", "anything", vec![], 50, 3);
        state.project_category = Some(ProjectCategory::Cli);

        let update = Classifier.execute(&state, &ctx).await.unwrap();
        assert!(update.project_category.is_none());
        assert_eq!(llm.call_count(), 0);
    }
}
