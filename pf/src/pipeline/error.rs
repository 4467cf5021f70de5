//! Pipeline error types

use thiserror::Error;

use super::node::NodeId;
use crate::llm::LlmError;
use crate::parser::ParseError;
use crate::prompts::PromptError;

/// Errors raised inside a node or while wiring the graph
///
/// Node errors never escape the orchestrator: they are recorded in state and
/// handed to the retry coordinator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("model call failed: {0}")]
    Model(#[from] LlmError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("model returned an empty response for {0}")]
    EmptyResponse(String),

    #[error(transparent)]
    Template(#[from] PromptError),

    #[error(transparent)]
    Router(#[from] RouterError),
}

impl PipelineError {
    /// Whether re-running the failed node could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Model(e) => e.is_retryable(),
            PipelineError::Parse(_) | PipelineError::EmptyResponse(_) => true,
            PipelineError::Validation(_)
            | PipelineError::BudgetExceeded(_)
            | PipelineError::Template(_)
            | PipelineError::Router(_) => false,
        }
    }
}

/// Graph wiring errors, detected when the orchestrator is built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("no transition registered for node {0}")]
    Unmapped(NodeId),

    #[error("transition registered twice for node {0}")]
    Duplicate(NodeId),

    #[error("no implementation registered for node {0}")]
    MissingNode(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::Model(LlmError::Timeout(Duration::from_secs(1))).is_retryable());
        assert!(!PipelineError::Model(LlmError::Exhausted("no key".to_string())).is_retryable());
        assert!(PipelineError::EmptyResponse("section".to_string()).is_retryable());
        assert!(PipelineError::Parse(ParseError::NoJson).is_retryable());
        assert!(!PipelineError::Validation("empty".to_string()).is_retryable());
        assert!(!PipelineError::Router(RouterError::Unmapped(NodeId::Clarifier)).is_retryable());
    }

    #[test]
    fn test_router_error_display() {
        let err = RouterError::Unmapped(NodeId::Aggregator);
        assert_eq!(err.to_string(), "no transition registered for node aggregation");
    }
}
