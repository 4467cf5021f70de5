//! Router - the transition table between nodes
//!
//! Every node maps to exactly one transition function. The table is checked
//! for totality when it is built, so a node with no outgoing edge is a
//! construction error rather than a silent mis-route at run time.

use std::collections::HashMap;

use tracing::debug;

use super::error::RouterError;
use super::node::NodeId;
use super::state::PipelineState;

/// Where a run goes after a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Next(NodeId),
    Halt(Halt),
}

/// Terminal states reachable through the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    /// Document produced
    Complete,
    /// Follow-up questions returned to the caller
    Clarification,
    /// Nothing left to try
    Failed(String),
}

/// A transition: reads the merged state, names the next step
pub type Transition = fn(&PipelineState) -> Route;

pub struct Router {
    table: HashMap<NodeId, Transition>,
}

impl Router {
    /// The standard pipeline graph
    pub fn standard() -> Result<Self, RouterError> {
        Self::from_table([
            (NodeId::IntentAnalyzer, after_intent as Transition),
            (NodeId::Clarifier, after_clarifier),
            (NodeId::Classifier, after_classifier),
            (NodeId::SectionPlanner, after_planner),
            (NodeId::SectionGenerator, after_generator),
            (NodeId::Aggregator, after_aggregator),
            (NodeId::RetryCoordinator, after_retry),
        ])
    }

    /// Build a router, rejecting duplicate or missing entries
    pub fn from_table(entries: impl IntoIterator<Item = (NodeId, Transition)>) -> Result<Self, RouterError> {
        let mut table = HashMap::new();
        for (node, transition) in entries {
            if table.insert(node, transition).is_some() {
                return Err(RouterError::Duplicate(node));
            }
        }
        if let Some(missing) = NodeId::ALL.into_iter().find(|id| !table.contains_key(id)) {
            return Err(RouterError::Unmapped(missing));
        }
        debug!(entries = table.len(), "Router::from_table: table is total");
        Ok(Self { table })
    }

    /// Next step after `from` has run and its update was merged
    pub fn next(&self, from: NodeId, state: &PipelineState) -> Route {
        let route = match self.table.get(&from) {
            Some(transition) => transition(state),
            None => Route::Halt(Halt::Failed(RouterError::Unmapped(from).to_string())),
        };
        debug!(%from, ?route, "Router::next");
        route
    }
}

/// Node a retry re-enters for a given failure
///
/// Unknown origins restart from classification, which is cache-aware and
/// therefore cheap to repeat.
pub fn retry_target(failed: Option<NodeId>) -> NodeId {
    match failed {
        Some(NodeId::RetryCoordinator) | None => NodeId::Classifier,
        Some(node) => node,
    }
}

fn failed(state: &PipelineState) -> bool {
    state.last_error.is_some()
}

fn after_intent(state: &PipelineState) -> Route {
    if failed(state) {
        return Route::Next(NodeId::RetryCoordinator);
    }
    if !state.needs_clarification {
        return Route::Next(NodeId::Classifier);
    }
    if state.clarification_questions.is_empty() {
        Route::Next(NodeId::Clarifier)
    } else {
        Route::Halt(Halt::Clarification)
    }
}

fn after_clarifier(state: &PipelineState) -> Route {
    if failed(state) {
        return Route::Next(NodeId::RetryCoordinator);
    }
    Route::Halt(Halt::Clarification)
}

fn after_classifier(state: &PipelineState) -> Route {
    if failed(state) {
        return Route::Next(NodeId::RetryCoordinator);
    }
    Route::Next(NodeId::SectionPlanner)
}

fn after_planner(state: &PipelineState) -> Route {
    if failed(state) {
        return Route::Next(NodeId::RetryCoordinator);
    }
    Route::Next(NodeId::SectionGenerator)
}

fn after_generator(state: &PipelineState) -> Route {
    if failed(state) {
        return Route::Next(NodeId::RetryCoordinator);
    }
    if state.remaining_sections().is_empty() {
        Route::Next(NodeId::Aggregator)
    } else {
        Route::Next(NodeId::SectionGenerator)
    }
}

/// The aggregator only ever leaves warnings, so `last_error` is not a failure here
fn after_aggregator(state: &PipelineState) -> Route {
    if state.final_plan.is_some() {
        Route::Halt(Halt::Complete)
    } else {
        Route::Halt(Halt::Failed("no sections were generated".to_string()))
    }
}

fn after_retry(state: &PipelineState) -> Route {
    if !state.retries_exhausted {
        return Route::Next(retry_target(state.failed_node));
    }
    if state.plan_sections.is_empty() {
        let reason = state.last_error.clone().unwrap_or_else(|| "retries exhausted".to_string());
        Route::Halt(Halt::Failed(reason))
    } else {
        Route::Next(NodeId::Aggregator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::{PlanSection, SectionSpec, StateUpdate};

    fn state() -> PipelineState {
        PipelineState::new("run", "prompt", vec![], 50, 3)
    }

    fn planned(titles: &[&str]) -> PipelineState {
        let mut state = state();
        state.apply(StateUpdate {
            sections: Some(
                titles
                    .iter()
                    .map(|t| SectionSpec {
                        title: t.to_string(),
                        description: String::new(),
                        intent: String::new(),
                        priority: 5,
                    })
                    .collect(),
            ),
            ..StateUpdate::default()
        });
        state
    }

    fn generated(state: &mut PipelineState, title: &str) {
        state.apply(StateUpdate {
            plan_section: Some(PlanSection {
                title: title.to_string(),
                content: "body".to_string(),
                order: 0,
            }),
            ..StateUpdate::default()
        });
    }

    fn noop(_: &PipelineState) -> Route {
        Route::Halt(Halt::Complete)
    }

    #[test]
    fn test_standard_router_is_total() {
        assert!(Router::standard().is_ok());
    }

    #[test]
    fn test_missing_entry_is_rejected() {
        let entries = NodeId::ALL
            .into_iter()
            .filter(|id| *id != NodeId::Aggregator)
            .map(|id| (id, noop as Transition));
        assert_eq!(Router::from_table(entries).err(), Some(RouterError::Unmapped(NodeId::Aggregator)));
    }

    #[test]
    fn test_duplicate_entry_is_rejected() {
        let mut entries: Vec<(NodeId, Transition)> = NodeId::ALL.into_iter().map(|id| (id, noop as Transition)).collect();
        entries.push((NodeId::Clarifier, noop));
        assert_eq!(Router::from_table(entries).err(), Some(RouterError::Duplicate(NodeId::Clarifier)));
    }

    #[test]
    fn test_intent_routes() {
        let router = Router::standard().unwrap();
        let mut s = state();
        assert_eq!(router.next(NodeId::IntentAnalyzer, &s), Route::Next(NodeId::Classifier));

        s.needs_clarification = true;
        assert_eq!(router.next(NodeId::IntentAnalyzer, &s), Route::Next(NodeId::Clarifier));

        s.clarification_questions.push("Who are the users?".to_string());
        assert_eq!(router.next(NodeId::IntentAnalyzer, &s), Route::Halt(Halt::Clarification));

        s.last_error = Some("timeout".to_string());
        assert_eq!(router.next(NodeId::IntentAnalyzer, &s), Route::Next(NodeId::RetryCoordinator));
    }

    #[test]
    fn test_generator_loops_until_done() {
        let router = Router::standard().unwrap();
        let mut s = planned(&["A", "B"]);
        generated(&mut s, "A");
        assert_eq!(router.next(NodeId::SectionGenerator, &s), Route::Next(NodeId::SectionGenerator));
        generated(&mut s, "B");
        assert_eq!(router.next(NodeId::SectionGenerator, &s), Route::Next(NodeId::Aggregator));
    }

    #[test]
    fn test_aggregator_ignores_warnings() {
        let router = Router::standard().unwrap();
        let mut s = state();
        s.final_plan = Some("# Plan".to_string());
        s.last_error = Some("degraded".to_string());
        assert_eq!(router.next(NodeId::Aggregator, &s), Route::Halt(Halt::Complete));
        s.final_plan = None;
        assert!(matches!(router.next(NodeId::Aggregator, &s), Route::Halt(Halt::Failed(_))));
    }

    #[test]
    fn test_retry_routes() {
        let router = Router::standard().unwrap();
        let mut s = planned(&["A", "B"]);
        s.failed_node = Some(NodeId::SectionGenerator);
        assert_eq!(router.next(NodeId::RetryCoordinator, &s), Route::Next(NodeId::SectionGenerator));

        s.retries_exhausted = true;
        s.last_error = Some("timeout".to_string());
        assert_eq!(
            router.next(NodeId::RetryCoordinator, &s),
            Route::Halt(Halt::Failed("timeout".to_string()))
        );

        generated(&mut s, "A");
        assert_eq!(router.next(NodeId::RetryCoordinator, &s), Route::Next(NodeId::Aggregator));
    }

    #[test]
    fn test_retry_target_defaults_to_classifier() {
        assert_eq!(retry_target(None), NodeId::Classifier);
        assert_eq!(retry_target(Some(NodeId::RetryCoordinator)), NodeId::Classifier);
        assert_eq!(retry_target(Some(NodeId::SectionPlanner)), NodeId::SectionPlanner);
    }
}
