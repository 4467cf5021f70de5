//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Clarity judgement for the incoming request
pub const INTENT: &str = include_str!("../../prompts/intent.pmt");

/// Follow-up questions for vague requests
pub const CLARIFY: &str = include_str!("../../prompts/clarify.pmt");

/// Project category, tech stack and complexity
pub const CLASSIFY: &str = include_str!("../../prompts/classify.pmt");

/// Per-request document outline
pub const SECTIONS: &str = include_str!("../../prompts/sections.pmt");

/// Body of one section
pub const SECTION: &str = include_str!("../../prompts/section.pmt");

/// Final document polish
pub const AGGREGATE: &str = include_str!("../../prompts/aggregate.pmt");

/// Short summary of the finished document
pub const SUMMARY: &str = include_str!("../../prompts/summary.pmt");

/// Conversation history compression
pub const HISTORY: &str = include_str!("../../prompts/history.pmt");

/// Names of every embedded template
pub const NAMES: [&str; 8] = [
    "intent",
    "clarify",
    "classify",
    "sections",
    "section",
    "aggregate",
    "summary",
    "history",
];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "intent" => Some(INTENT),
        "clarify" => Some(CLARIFY),
        "classify" => Some(CLASSIFY),
        "sections" => Some(SECTIONS),
        "section" => Some(SECTION),
        "aggregate" => Some(AGGREGATE),
        "summary" => Some(SUMMARY),
        "history" => Some(HISTORY),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
