//! Pipeline nodes
//!
//! One module per step. [`NodeRegistry::standard`] wires them all; tests can
//! swap individual nodes with [`NodeRegistry::with_node`].

use std::collections::HashMap;

use tracing::debug;

use super::error::RouterError;
use super::node::{Node, NodeId};

mod aggregator;
mod classifier;
mod clarifier;
mod generator;
mod intent;
mod planner;
mod retry;

pub use aggregator::{Aggregator, concatenate_sections, template_summary};
pub use clarifier::{Clarifier, GENERIC_QUESTIONS, normalize_questions};
pub use classifier::{Classifier, scan_tech_mentions};
pub use generator::{SectionGenerator, previous_sections_context, token_budget};
pub use intent::{IntentAnalysis, IntentAnalyzer, heuristic_analysis, is_intent_clear, wants_defaults};
pub use planner::{SectionPlanner, fallback_sections, normalize_sections};
pub use retry::{RetryCoordinator, backoff_delay};

/// Node implementations keyed by id
pub struct NodeRegistry {
    nodes: HashMap<NodeId, Box<dyn Node>>,
}

impl NodeRegistry {
    /// All standard nodes
    pub fn standard() -> Self {
        debug!("NodeRegistry::standard: called");
        Self {
            nodes: HashMap::new(),
        }
        .with_node(Box::new(IntentAnalyzer))
        .with_node(Box::new(Clarifier))
        .with_node(Box::new(Classifier))
        .with_node(Box::new(SectionPlanner))
        .with_node(Box::new(SectionGenerator))
        .with_node(Box::new(Aggregator))
        .with_node(Box::new(RetryCoordinator))
    }

    /// Register `node`, replacing any node with the same id
    pub fn with_node(mut self, node: Box<dyn Node>) -> Self {
        debug!(node = %node.id(), "NodeRegistry::with_node: called");
        self.nodes.insert(node.id(), node);
        self
    }

    pub fn get(&self, id: NodeId) -> Option<&dyn Node> {
        self.nodes.get(&id).map(|n| n.as_ref())
    }

    /// Every node id must have an implementation
    pub fn ensure_complete(&self) -> Result<(), RouterError> {
        match NodeId::ALL.into_iter().find(|id| !self.nodes.contains_key(id)) {
            Some(missing) => Err(RouterError::MissingNode(missing)),
            None => Ok(()),
        }
    }
}
