//! Context budgeting
//!
//! Token estimation plus the summariser that keeps conversation history and
//! finished documents small enough to send back to the model.

mod summarizer;
pub mod tokens;

pub use summarizer::{ContextSummarizer, Summary};
pub use tokens::{estimate_tokens, preview, truncate_chars, truncate_to_tokens};
