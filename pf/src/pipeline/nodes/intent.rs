//! Intent Analyzer - decides whether the request is clear enough to plan

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::IntentConfig;
use crate::context::preview;
use crate::llm::CompletionRequest;
use crate::pipeline::error::PipelineError;
use crate::pipeline::node::{Node, NodeContext, NodeId};
use crate::pipeline::state::{PipelineState, StateUpdate};

/// The model's clarity judgement
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntentAnalysis {
    pub is_vague: bool,
    pub has_sufficient_detail: bool,
    pub detected_intent: String,
    pub missing_info: Vec<String>,
    pub confidence: f64,
    pub can_proceed_with_defaults: bool,
}

/// Clear if confident, confident enough with defaults allowed, or detailed with nothing missing
pub fn is_intent_clear(analysis: &IntentAnalysis, config: &IntentConfig) -> bool {
    analysis.confidence >= config.clear_confidence
        || (analysis.confidence >= config.defaults_confidence && analysis.can_proceed_with_defaults)
        || (analysis.has_sufficient_detail && analysis.missing_info.is_empty())
}

/// Whether the user asked to skip clarification
pub fn wants_defaults(prompt: &str, config: &IntentConfig) -> bool {
    let lowered = prompt.to_lowercase();
    config
        .bypass_phrases
        .iter()
        .any(|phrase| !phrase.is_empty() && lowered.contains(&phrase.to_lowercase()))
}

/// Word-count judgement used when the model answer cannot be parsed
pub fn heuristic_analysis(prompt: &str, config: &IntentConfig) -> IntentAnalysis {
    let words = prompt.split_whitespace().count();
    debug!(words, min_words = config.min_words, "heuristic_analysis: called");
    if words >= config.min_words {
        IntentAnalysis {
            is_vague: false,
            has_sufficient_detail: true,
            detected_intent: preview(prompt, 200),
            missing_info: Vec::new(),
            confidence: 0.6,
            can_proceed_with_defaults: true,
        }
    } else {
        IntentAnalysis {
            is_vague: true,
            has_sufficient_detail: false,
            detected_intent: preview(prompt, 200),
            missing_info: vec![
                "the main purpose and target users".to_string(),
                "the core features required".to_string(),
                "technical or platform constraints".to_string(),
            ],
            confidence: 0.3,
            can_proceed_with_defaults: false,
        }
    }
}

pub struct IntentAnalyzer;

impl IntentAnalyzer {
    fn with_defaults(update: &mut StateUpdate, state: &PipelineState, config: &IntentConfig) {
        if state.project_complexity.is_none() {
            update.project_complexity = Some(config.default_complexity);
        }
        if state.detected_tech_stack.is_empty() && state.suggested_tech_stack.is_empty() {
            update.suggested_tech_stack = config.default_tech_stack.iter().cloned().collect();
        }
    }
}

#[async_trait]
impl Node for IntentAnalyzer {
    fn id(&self) -> NodeId {
        NodeId::IntentAnalyzer
    }

    async fn execute(&self, state: &PipelineState, ctx: &NodeContext) -> Result<StateUpdate, PipelineError> {
        debug!(run_id = %state.run_id, "IntentAnalyzer::execute: called");
        let config = &ctx.config.intent;
        let mut update = StateUpdate::empty();

        if wants_defaults(&state.user_prompt, config) {
            info!(run_id = %state.run_id, "IntentAnalyzer: bypass phrase found, proceeding with defaults");
            update.needs_clarification = Some(false);
            update.intent_confidence = Some(1.0);
            update.detected_intent = Some(preview(&state.user_prompt, 200));
            Self::with_defaults(&mut update, state, config);
            return Ok(update);
        }

        let conversation = ctx.summarizer.conversation_context(&state.history).await;
        update.record_usage(conversation.tokens_used, conversation.model.clone());

        let system = ctx.render(
            "intent",
            &json!({
                "has_conversation": !conversation.text.is_empty(),
                "conversation": conversation.text,
            }),
        )?;
        let request = CompletionRequest::new("intent", system, state.user_prompt.as_str())
            .with_max_tokens(config.max_tokens)
            .with_temperature(ctx.config.analysis_temperature);

        let answer = ctx
            .ask_structured(request, || heuristic_analysis(&state.user_prompt, config))
            .await?;
        answer.record_usage(&mut update);
        let analysis = answer.parsed.into_inner();

        let clear = is_intent_clear(&analysis, config);
        info!(
            run_id = %state.run_id,
            confidence = analysis.confidence,
            clear,
            missing = analysis.missing_info.len(),
            "IntentAnalyzer: judged request"
        );

        update.needs_clarification = Some(!clear);
        update.intent_confidence = Some(analysis.confidence);
        if !analysis.detected_intent.trim().is_empty() {
            update.detected_intent = Some(analysis.detected_intent.trim().to_string());
        }
        update.missing_info = analysis
            .missing_info
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if clear {
            Self::with_defaults(&mut update, state, config);
        }
        Ok(update)
    }
}
