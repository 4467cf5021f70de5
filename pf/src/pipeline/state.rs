//! PipelineState - the single record threaded through a run
//!
//! Nodes never mutate the state directly. They read a snapshot and return a
//! [`StateUpdate`]; [`PipelineState::apply`] is the only place the running
//! state changes, and it is where the merge rules live:
//!
//! - scalar fields overwrite
//! - list and set fields append or union
//! - set-once fields (`sections`, `final_plan`, `plan_summary`) ignore later writes
//! - classification (category, complexity, tech stacks) is cache-once as a
//!   group; values written before it lands are provisional defaults
//! - `step_count` grows by exactly one per applied update

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::node::NodeId;
use crate::llm::Role;

/// One message of prior conversation supplied with a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    /// Cached summary of this message, used in place of the content for older turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl HistoryMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// Project complexity tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
        }
    }

    /// Lenient parse of model output ("Medium", "HIGH", "low complexity", ...)
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        let word = lowered.split_whitespace().next()?;
        match word {
            "simple" | "low" | "easy" | "basic" | "small" => Some(Complexity::Simple),
            "moderate" | "medium" | "intermediate" | "average" => Some(Complexity::Moderate),
            "complex" | "high" | "hard" | "advanced" | "large" | "enterprise" => Some(Complexity::Complex),
            _ => None,
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed set of project categories the classifier chooses from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectCategory {
    WebApp,
    MobileApp,
    Api,
    DataPipeline,
    MachineLearning,
    DesktopApp,
    Cli,
    Library,
    Infrastructure,
    Game,
    General,
}

impl ProjectCategory {
    pub const ALL: [ProjectCategory; 11] = [
        ProjectCategory::WebApp,
        ProjectCategory::MobileApp,
        ProjectCategory::Api,
        ProjectCategory::DataPipeline,
        ProjectCategory::MachineLearning,
        ProjectCategory::DesktopApp,
        ProjectCategory::Cli,
        ProjectCategory::Library,
        ProjectCategory::Infrastructure,
        ProjectCategory::Game,
        ProjectCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectCategory::WebApp => "web_app",
            ProjectCategory::MobileApp => "mobile_app",
            ProjectCategory::Api => "api",
            ProjectCategory::DataPipeline => "data_pipeline",
            ProjectCategory::MachineLearning => "machine_learning",
            ProjectCategory::DesktopApp => "desktop_app",
            ProjectCategory::Cli => "cli",
            ProjectCategory::Library => "library",
            ProjectCategory::Infrastructure => "infrastructure",
            ProjectCategory::Game => "game",
            ProjectCategory::General => "general",
        }
    }

    /// Human-readable label ("web app")
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }

    /// Lenient parse of model output ("Web Application", "web-app", "ML", ...)
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let normalized = normalized.trim_matches('_');

        if let Some(exact) = Self::ALL.iter().find(|c| c.as_str() == normalized) {
            return Some(*exact);
        }

        match normalized {
            "web" | "website" | "web_application" | "webapp" | "frontend" | "saas" | "e_commerce" | "ecommerce" => {
                Some(ProjectCategory::WebApp)
            }
            "mobile" | "mobile_application" | "ios" | "android" | "ios_app" | "android_app" => {
                Some(ProjectCategory::MobileApp)
            }
            "backend" | "rest_api" | "graphql_api" | "service" | "microservice" | "web_service" | "api_service" => {
                Some(ProjectCategory::Api)
            }
            "data" | "etl" | "analytics" | "data_engineering" | "data_platform" => Some(ProjectCategory::DataPipeline),
            "ml" | "ai" | "ai_ml" | "ml_ai" | "ml_model" | "ai_application" => Some(ProjectCategory::MachineLearning),
            "desktop" | "desktop_application" => Some(ProjectCategory::DesktopApp),
            "command_line" | "command_line_tool" | "cli_tool" | "tool" => Some(ProjectCategory::Cli),
            "sdk" | "package" | "framework" => Some(ProjectCategory::Library),
            "infra" | "devops" | "platform" | "cloud_infrastructure" => Some(ProjectCategory::Infrastructure),
            "video_game" | "gaming" => Some(ProjectCategory::Game),
            "other" | "unknown" | "misc" => Some(ProjectCategory::General),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProjectCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One planned section of the deliverable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub title: String,
    pub description: String,
    pub intent: String,
    /// 1 (nice to have) ..= 10 (essential)
    pub priority: u8,
}

/// One generated section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSection {
    pub title: String,
    pub content: String,
    /// Generation sequence, starting at 1
    pub order: u32,
}

/// A node failure recorded in state for the retry coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub node: NodeId,
    pub message: String,
    pub retryable: bool,
}

/// Delta returned by a node; merged by [`PipelineState::apply`]
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub needs_clarification: Option<bool>,
    pub clarification_questions: Vec<String>,
    pub intent_confidence: Option<f64>,
    pub detected_intent: Option<String>,
    pub missing_info: Vec<String>,

    pub project_category: Option<ProjectCategory>,
    pub project_complexity: Option<Complexity>,
    pub detected_tech_stack: BTreeSet<String>,
    pub suggested_tech_stack: BTreeSet<String>,

    pub sections: Option<Vec<SectionSpec>>,
    pub plan_section: Option<PlanSection>,

    pub final_plan: Option<String>,
    pub plan_summary: Option<String>,

    pub failure: Option<NodeFailure>,
    /// Annotation stored in `last_error` without marking a failed node
    pub warning: Option<String>,
    pub clear_error: bool,
    pub bump_retry: bool,
    pub retries_exhausted: bool,
    /// Delay the orchestrator waits before the next node
    pub backoff: Option<Duration>,

    pub model_used: Option<String>,
    pub tokens_used: u64,
}

impl StateUpdate {
    /// An update that changes nothing but the step count
    pub fn empty() -> Self {
        Self::default()
    }

    /// Record a failure of `node`
    pub fn failed(node: NodeId, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            failure: Some(NodeFailure {
                node,
                message: message.into(),
                retryable,
            }),
            ..Self::default()
        }
    }

    /// Account for one model call
    pub fn record_usage(&mut self, tokens: u64, model: Option<String>) {
        self.tokens_used += tokens;
        if model.is_some() {
            self.model_used = model;
        }
    }
}

/// The mutable record of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub run_id: String,

    pub user_prompt: String,
    pub history: Vec<HistoryMessage>,

    pub needs_clarification: bool,
    pub clarification_questions: Vec<String>,
    pub intent_confidence: Option<f64>,
    pub detected_intent: Option<String>,
    pub missing_info: Vec<String>,

    pub project_category: Option<ProjectCategory>,
    pub detected_tech_stack: BTreeSet<String>,
    pub suggested_tech_stack: BTreeSet<String>,
    pub project_complexity: Option<Complexity>,

    pub sections: Option<Vec<SectionSpec>>,
    pub generated_sections: BTreeSet<String>,
    pub plan_sections: Vec<PlanSection>,

    pub final_plan: Option<String>,
    pub plan_summary: Option<String>,

    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub failed_node: Option<NodeId>,
    pub error_retryable: bool,
    pub retries_exhausted: bool,

    pub step_count: u32,
    pub max_steps: u32,

    pub model_used: String,
    pub total_tokens_used: u64,
}

impl PipelineState {
    /// Fresh state for one request
    pub fn new(
        run_id: impl Into<String>,
        user_prompt: impl Into<String>,
        history: Vec<HistoryMessage>,
        max_steps: u32,
        max_retries: u32,
    ) -> Self {
        let run_id = run_id.into();
        debug!(%run_id, history_len = history.len(), max_steps, max_retries, "PipelineState::new: called");
        Self {
            run_id,
            user_prompt: user_prompt.into(),
            history,
            needs_clarification: false,
            clarification_questions: Vec::new(),
            intent_confidence: None,
            detected_intent: None,
            missing_info: Vec::new(),
            project_category: None,
            detected_tech_stack: BTreeSet::new(),
            suggested_tech_stack: BTreeSet::new(),
            project_complexity: None,
            sections: None,
            generated_sections: BTreeSet::new(),
            plan_sections: Vec::new(),
            final_plan: None,
            plan_summary: None,
            retry_count: 0,
            max_retries,
            last_error: None,
            failed_node: None,
            error_retryable: false,
            retries_exhausted: false,
            step_count: 0,
            max_steps,
            model_used: String::new(),
            total_tokens_used: 0,
        }
    }

    /// Planned sections not generated yet, in plan order
    pub fn remaining_sections(&self) -> Vec<&SectionSpec> {
        self.sections
            .iter()
            .flatten()
            .filter(|s| !self.generated_sections.contains(&s.title))
            .collect()
    }

    /// Complexity, or the default tier when unknown
    pub fn complexity(&self) -> Complexity {
        self.project_complexity.unwrap_or_default()
    }

    /// Requested technologies first, then suggestions
    pub fn tech_stack(&self) -> Vec<String> {
        self.detected_tech_stack
            .iter()
            .chain(self.suggested_tech_stack.iter().filter(|t| !self.detected_tech_stack.contains(*t)))
            .cloned()
            .collect()
    }

    /// Whether the step budget forbids another node execution
    pub fn step_budget_exhausted(&self) -> bool {
        self.step_count >= self.max_steps
    }

    /// Merge a node's delta into the running state
    pub fn apply(&mut self, update: StateUpdate) {
        debug!(run_id = %self.run_id, step = self.step_count, "PipelineState::apply: called");
        self.step_count += 1;

        if let Some(needs) = update.needs_clarification {
            self.needs_clarification = needs;
        }
        self.clarification_questions.extend(update.clarification_questions);
        if update.intent_confidence.is_some() {
            self.intent_confidence = update.intent_confidence.map(|c| c.clamp(0.0, 1.0));
        }
        if update.detected_intent.is_some() {
            self.detected_intent = update.detected_intent;
        }
        self.missing_info.extend(update.missing_info);

        self.apply_classification(
            update.project_category,
            update.project_complexity,
            update.detected_tech_stack,
            update.suggested_tech_stack,
        );

        if let Some(sections) = update.sections {
            if self.sections.is_none() {
                self.sections = Some(sections);
            } else {
                warn!(run_id = %self.run_id, "PipelineState::apply: sections already planned, ignoring new plan");
            }
        }

        if let Some(section) = update.plan_section {
            self.append_plan_section(section);
        }

        if self.final_plan.is_none() {
            self.final_plan = update.final_plan;
        }
        if self.plan_summary.is_none() {
            self.plan_summary = update.plan_summary;
        }

        if update.clear_error {
            self.last_error = None;
            self.error_retryable = false;
        }
        if let Some(failure) = update.failure {
            self.last_error = Some(failure.message);
            self.failed_node = Some(failure.node);
            self.error_retryable = failure.retryable;
        }
        if let Some(warning) = update.warning {
            // Warnings annotate an outstanding error rather than hide it
            self.last_error = Some(match self.last_error.take() {
                Some(error) => format!("{error}; {warning}"),
                None => warning,
            });
        }
        if update.bump_retry {
            self.retry_count += 1;
        }
        self.retries_exhausted |= update.retries_exhausted;

        if let Some(model) = update.model_used {
            self.model_used = model;
        }
        self.total_tokens_used += update.tokens_used;
    }

    fn apply_classification(
        &mut self,
        category: Option<ProjectCategory>,
        complexity: Option<Complexity>,
        detected: BTreeSet<String>,
        suggested: BTreeSet<String>,
    ) {
        match category {
            Some(category) if self.project_category.is_none() => {
                debug!(run_id = %self.run_id, %category, "apply_classification: classification landed");
                self.project_category = Some(category);
                if complexity.is_some() {
                    self.project_complexity = complexity;
                }
                self.detected_tech_stack = detected;
                self.suggested_tech_stack = suggested;
            }
            _ => {
                if self.project_complexity.is_none() {
                    self.project_complexity = complexity;
                }
                self.detected_tech_stack.extend(detected);
                self.suggested_tech_stack.extend(suggested);
            }
        }
    }

    fn append_plan_section(&mut self, mut section: PlanSection) {
        let planned = self
            .sections
            .iter()
            .flatten()
            .any(|s| s.title == section.title);
        if !planned {
            warn!(run_id = %self.run_id, title = %section.title, "append_plan_section: title not in plan, dropping");
            return;
        }
        if self.generated_sections.contains(&section.title) {
            warn!(run_id = %self.run_id, title = %section.title, "append_plan_section: already generated, dropping");
            return;
        }
        section.order = self.plan_sections.len() as u32 + 1;
        self.generated_sections.insert(section.title.clone());
        self.plan_sections.push(section);
    }
}
