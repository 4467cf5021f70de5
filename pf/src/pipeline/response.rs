//! Run outcome and the response returned to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::state::{Complexity, PipelineState, ProjectCategory};

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// A document was produced; `salvaged` when built from partial sections
    Complete { salvaged: bool },
    /// Follow-up questions are waiting for the caller
    Clarification,
    /// Unrecoverable failure
    Failed { reason: String },
    /// The step budget ran out before the run finished
    BudgetExceeded { steps: u32 },
    /// The caller cancelled the run
    Cancelled,
    /// The request failed validation; no node ran
    Rejected { reason: String },
}

impl HaltReason {
    /// Short name used in logs and events
    pub fn name(&self) -> &'static str {
        match self {
            HaltReason::Complete { salvaged: false } => "complete",
            HaltReason::Complete { salvaged: true } => "salvaged",
            HaltReason::Clarification => "clarification",
            HaltReason::Failed { .. } => "failed",
            HaltReason::BudgetExceeded { .. } => "budget_exceeded",
            HaltReason::Cancelled => "cancelled",
            HaltReason::Rejected { .. } => "rejected",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HaltReason::Complete { .. } | HaltReason::Clarification)
    }
}

/// Final state of a run together with why it stopped
///
/// The state is kept on every path so partial work stays inspectable.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub halt: HaltReason,
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        self.halt.is_success()
    }

    /// Caller-facing response
    pub fn to_response(&self) -> PipelineResponse {
        let state = &self.state;
        match &self.halt {
            HaltReason::Complete { salvaged } => match &state.final_plan {
                Some(markdown) => PipelineResponse {
                    success: true,
                    data: Some(ResponseData {
                        markdown: markdown.clone(),
                        summary: state.plan_summary.clone().unwrap_or_default(),
                        metadata: ResponseMetadata::from_state(state, *salvaged),
                    }),
                    message: match (*salvaged, &state.last_error) {
                        (true, Some(error)) => Some(format!("partial plan after retries were exhausted: {error}")),
                        (true, None) => Some("partial plan after retries were exhausted".to_string()),
                        (false, warning) => warning.clone(),
                    },
                    needs_clarification: None,
                    clarification_questions: None,
                },
                None => PipelineResponse::failure("run completed without a document"),
            },
            HaltReason::Clarification => PipelineResponse {
                success: true,
                data: None,
                message: Some("More detail is needed before a plan can be written.".to_string()),
                needs_clarification: Some(true),
                clarification_questions: Some(state.clarification_questions.clone()),
            },
            HaltReason::Failed { reason } => PipelineResponse::failure(reason.clone()),
            HaltReason::BudgetExceeded { steps } => PipelineResponse::failure(
                PipelineError::BudgetExceeded(format!(
                    "step budget of {} exhausted after {} of {} sections",
                    steps,
                    state.plan_sections.len(),
                    state.sections.as_ref().map_or(0, Vec::len)
                ))
                .to_string(),
            ),
            HaltReason::Cancelled => PipelineResponse::failure("run cancelled"),
            HaltReason::Rejected { reason } => PipelineResponse::failure(reason.clone()),
        }
    }
}

/// Response shape returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub success: bool,
    pub data: Option<ResponseData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_clarification: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_questions: Option<Vec<String>>,
}

impl PipelineResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            needs_clarification: None,
            clarification_questions: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    pub markdown: String,
    pub summary: String,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub generated_at: DateTime<Utc>,
    pub classification: Classification,
    pub model_used: String,
    pub total_tokens: u64,
    pub summary: RunSummary,
    /// Built from a subset of the planned sections
    pub partial: bool,
}

impl ResponseMetadata {
    fn from_state(state: &PipelineState, salvaged: bool) -> Self {
        let planned = state.sections.as_ref().map_or(0, Vec::len);
        Self {
            generated_at: Utc::now(),
            classification: Classification {
                category: state.project_category,
                complexity: state.project_complexity,
                detected_tech_stack: state.detected_tech_stack.iter().cloned().collect(),
                suggested_tech_stack: state.suggested_tech_stack.iter().cloned().collect(),
            },
            model_used: state.model_used.clone(),
            total_tokens: state.total_tokens_used,
            summary: RunSummary {
                run_id: state.run_id.clone(),
                steps: state.step_count,
                retries: state.retry_count,
                sections_planned: planned,
                sections_generated: state.plan_sections.len(),
                salvaged,
            },
            partial: salvaged || state.plan_sections.len() < planned,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Option<ProjectCategory>,
    pub complexity: Option<Complexity>,
    pub detected_tech_stack: Vec<String>,
    pub suggested_tech_stack: Vec<String>,
}

/// How the run went
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub steps: u32,
    pub retries: u32,
    pub sections_planned: usize,
    pub sections_generated: usize,
    pub salvaged: bool,
}
