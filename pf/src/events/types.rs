//! Event types for pipeline activity streaming
//!
//! These events describe everything observable about a run:
//! - Run lifecycle (start, halt)
//! - Node execution (start, complete)
//! - Progress (section generated, retry scheduled)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::NodeId;

/// Core event enum - the vocabulary of pipeline activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    // === Run Lifecycle ===
    /// A run has accepted its request
    RunStarted {
        run_id: String,
        /// First 120 chars of the prompt
        prompt_preview: String,
        history_len: usize,
        timestamp: DateTime<Utc>,
    },
    /// A run has stopped
    RunHalted {
        run_id: String,
        /// Short outcome name, e.g. "complete" or "budget_exceeded"
        outcome: String,
        success: bool,
        steps: u32,
        total_tokens: u64,
        timestamp: DateTime<Utc>,
    },

    // === Nodes ===
    /// A node is about to execute
    NodeStarted {
        run_id: String,
        node: NodeId,
        step: u32,
        timestamp: DateTime<Utc>,
    },
    /// A node has returned its update
    NodeCompleted {
        run_id: String,
        node: NodeId,
        step: u32,
        tokens_used: u64,
        /// Whether the node recorded a failure
        failed: bool,
        timestamp: DateTime<Utc>,
    },

    // === Progress ===
    /// A section body was accepted into the plan
    SectionGenerated {
        run_id: String,
        title: String,
        order: u32,
        total: usize,
        timestamp: DateTime<Utc>,
    },
    /// The retry coordinator scheduled another attempt
    RetryScheduled {
        run_id: String,
        target: NodeId,
        attempt: u32,
        delay_ms: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Get the run ID for this event
    pub fn run_id(&self) -> &str {
        match self {
            PipelineEvent::RunStarted { run_id, .. }
            | PipelineEvent::RunHalted { run_id, .. }
            | PipelineEvent::NodeStarted { run_id, .. }
            | PipelineEvent::NodeCompleted { run_id, .. }
            | PipelineEvent::SectionGenerated { run_id, .. }
            | PipelineEvent::RetryScheduled { run_id, .. } => run_id,
        }
    }

    /// Get the event type name (for logging/filtering)
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. } => "RunStarted",
            PipelineEvent::RunHalted { .. } => "RunHalted",
            PipelineEvent::NodeStarted { .. } => "NodeStarted",
            PipelineEvent::NodeCompleted { .. } => "NodeCompleted",
            PipelineEvent::SectionGenerated { .. } => "SectionGenerated",
            PipelineEvent::RetryScheduled { .. } => "RetryScheduled",
        }
    }

    /// When the event was emitted
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PipelineEvent::RunStarted { timestamp, .. }
            | PipelineEvent::RunHalted { timestamp, .. }
            | PipelineEvent::NodeStarted { timestamp, .. }
            | PipelineEvent::NodeCompleted { timestamp, .. }
            | PipelineEvent::SectionGenerated { timestamp, .. }
            | PipelineEvent::RetryScheduled { timestamp, .. } => *timestamp,
        }
    }

    /// Whether this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::RunHalted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PipelineEvent::NodeStarted {
            run_id: "r1".to_string(),
            node: NodeId::SectionPlanner,
            step: 3,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "NodeStarted");
        assert_eq!(json["node"], "section_planner");
        assert_eq!(json["step"], 3);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_event_accessors() {
        let event = PipelineEvent::RunHalted {
            run_id: "r2".to_string(),
            outcome: "complete".to_string(),
            success: true,
            steps: 9,
            total_tokens: 1200,
            timestamp: Utc::now(),
        };
        assert_eq!(event.run_id(), "r2");
        assert_eq!(event.event_type(), "RunHalted");
        assert!(event.is_terminal());
    }
}
