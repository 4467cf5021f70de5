//! Clarifier - follow-up questions for requests too vague to plan

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::llm::CompletionRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::node::{Node, NodeContext, NodeId};
use crate::pipeline::state::{PipelineState, StateUpdate};

pub const MIN_QUESTIONS: usize = 2;
pub const MAX_QUESTIONS: usize = 4;

/// Asked when the model gives nothing usable
pub const GENERIC_QUESTIONS: [&str; 3] = [
    "Who will use this project, and what problem should it solve for them?",
    "Which features must the first version include, and which can wait?",
    "Are there constraints we should plan around, such as platforms, existing systems, budget or timeline?",
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionsReply {
    Wrapped { questions: Vec<String> },
    Bare(Vec<String>),
}

impl QuestionsReply {
    fn into_questions(self) -> Vec<String> {
        match self {
            QuestionsReply::Wrapped { questions } | QuestionsReply::Bare(questions) => questions,
        }
    }
}

/// Trim, dedupe, cap at `max`, and top up from the generic set below `min`
pub fn normalize_questions(raw: Vec<String>, min: usize, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut questions: Vec<String> = raw
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty() && seen.insert(q.to_lowercase()))
        .take(max)
        .collect();

    for generic in GENERIC_QUESTIONS {
        if questions.len() >= min {
            break;
        }
        if seen.insert(generic.to_lowercase()) {
            questions.push(generic.to_string());
        }
    }
    questions
}

pub struct Clarifier;

#[async_trait]
impl Node for Clarifier {
    fn id(&self) -> NodeId {
        NodeId::Clarifier
    }

    async fn execute(&self, state: &PipelineState, ctx: &NodeContext) -> Result<StateUpdate, PipelineError> {
        debug!(run_id = %state.run_id, missing = state.missing_info.len(), "Clarifier::execute: called");
        let mut update = StateUpdate::empty();
        if !state.clarification_questions.is_empty() {
            debug!("Clarifier::execute: questions already cached");
            return Ok(update);
        }

        let system = ctx.render(
            "clarify",
            &json!({
                "detected_intent": state.detected_intent,
                "missing_info": state.missing_info,
                "min_questions": MIN_QUESTIONS,
                "max_questions": MAX_QUESTIONS,
            }),
        )?;
        let request = CompletionRequest::new("clarify", system, state.user_prompt.as_str())
            .with_max_tokens(ctx.config.intent.max_tokens)
            .with_temperature(ctx.config.analysis_temperature);

        let answer = ctx
            .ask_structured(request, || {
                QuestionsReply::Bare(GENERIC_QUESTIONS.iter().map(|q| q.to_string()).collect())
            })
            .await?;
        answer.record_usage(&mut update);

        let questions = normalize_questions(answer.parsed.into_inner().into_questions(), MIN_QUESTIONS, MAX_QUESTIONS);
        info!(run_id = %state.run_id, count = questions.len(), "Clarifier: asking follow-up questions");
        update.needs_clarification = Some(true);
        update.clarification_questions = questions;
        Ok(update)
    }
}
