//! PlanForge - adaptive document-generation pipeline
//!
//! Given a free-form request and optional conversation history, PlanForge
//! decides whether the request is clear enough to act on, classifies the
//! project, plans the sections this particular document needs, writes them
//! one at a time with a generative model, and assembles the result.
//!
//! # Core Concepts
//!
//! - **Immutable snapshots**: nodes read the state and return a delta; only the
//!   orchestrator merges
//! - **Bounded loops**: the section plan is fixed once made, and every run has a
//!   step budget
//! - **Failures are data**: a node failure is recorded in state and handed to the
//!   retry coordinator, which retries, salvages or gives up
//! - **Fallbacks everywhere**: unparseable model output degrades to defaults
//!
//! # Modules
//!
//! - [`pipeline`] - state, nodes, router and orchestrator
//! - [`llm`] - model client trait and OpenAI-compatible implementation
//! - [`context`] - token estimation and summarisation
//! - [`parser`] - JSON extraction from model output
//! - [`prompts`] - prompt templates
//! - [`events`] - progress events
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod context;
pub mod events;
pub mod llm;
pub mod parser;
pub mod pipeline;
pub mod prompts;

// Re-export commonly used types
pub use config::{Config, LlmConfig, PipelineConfig};
pub use context::{ContextSummarizer, Summary, estimate_tokens};
pub use events::{EventBus, EventEmitter, PipelineEvent};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use parser::{ParseError, Parsed, extract_json, parse_json};
pub use pipeline::{
    HaltReason, HistoryMessage, NodeId, Orchestrator, PipelineError, PipelineOutcome, PipelineRequest,
    PipelineResponse, PipelineState,
};
pub use prompts::PromptLoader;
