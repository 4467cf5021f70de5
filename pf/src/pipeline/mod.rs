//! Adaptive document-generation pipeline
//!
//! A request flows through a fixed graph of nodes:
//!
//! ```text
//! IntentAnalyzer ──┬─> Clarifier ─> halt (questions for the caller)
//!                  └─> Classifier ─> SectionPlanner ─> SectionGenerator* ─> Aggregator ─> halt
//!
//! any failing node ─> RetryCoordinator ─┬─> failed node again (after backoff)
//!                                       ├─> Aggregator (salvage partial sections)
//!                                       └─> halt (failure)
//! ```
//!
//! Nodes read an immutable [`PipelineState`] and return a [`StateUpdate`]; the
//! [`Orchestrator`] merges updates, consults the [`Router`] and enforces the
//! step budget and cancellation between nodes.

mod error;
mod node;
pub mod nodes;
mod orchestrator;
mod request;
mod response;
mod router;
mod state;

pub use error::{PipelineError, RouterError};
pub use node::{Node, NodeContext, NodeId, Structured};
pub use nodes::NodeRegistry;
pub use orchestrator::Orchestrator;
pub use request::PipelineRequest;
pub use response::{
    Classification, HaltReason, PipelineOutcome, PipelineResponse, ResponseData, ResponseMetadata, RunSummary,
};
pub use router::{Halt, Route, Router, Transition, retry_target};
pub use state::{
    Complexity, HistoryMessage, NodeFailure, PipelineState, PlanSection, ProjectCategory, SectionSpec, StateUpdate,
};
