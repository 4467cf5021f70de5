//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for every model call the
//! pipeline makes.
//!
//! Template loading chain:
//! 1. `.planforge/prompts/{name}.pmt` (project override)
//! 2. Embedded fallback compiled from `prompts/{name}.pmt`
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{PromptError, PromptLoader};
