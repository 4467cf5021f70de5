//! Structured data extraction from free-text model output
//!
//! Models are asked for JSON but routinely wrap it in prose or markdown
//! fences. Parsing is fallible by nature, so callers get a tagged result:
//! either the parsed value or their own default together with the reason the
//! parse failed. Nothing here panics or raises past the caller.

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Why model output could not be parsed
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object or array found in model output")]
    NoJson,

    #[error("malformed JSON in model output: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Outcome of a parse that never fails
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    /// The model output parsed cleanly
    Ok(T),
    /// The caller-supplied default, and why it was needed
    Fallback { value: T, reason: String },
}

impl<T> Parsed<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Parsed::Fallback { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Parsed::Ok(value) | Parsed::Fallback { value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Parsed::Ok(value) | Parsed::Fallback { value, .. } => value,
        }
    }
}

/// Bracket positions tried before giving up on a reply
const MAX_CANDIDATES: usize = 64;

/// Spans of `text` that may hold the JSON payload, most likely first
///
/// A fenced block comes first, then every balanced object or array in order
/// of its opening bracket, then the widest span from the first opening
/// bracket to its last closer (for replies cut off mid-payload).
fn candidates(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    if let Some(fenced) = fenced_block(text) {
        let trimmed = fenced.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            spans.push(trimmed);
        }
    }

    let starts: Vec<usize> = text
        .char_indices()
        .filter(|(_, ch)| matches!(ch, '{' | '['))
        .map(|(i, _)| i)
        .take(MAX_CANDIDATES)
        .collect();
    spans.extend(starts.iter().filter_map(|&start| balanced_end(text, start).map(|end| &text[start..=end])));

    if let Some(&start) = starts.first() {
        let closer = if text[start..].starts_with('{') { '}' } else { ']' };
        if let Some(end) = text.rfind(closer).filter(|&end| end > start) {
            spans.push(&text[start..=end]);
        }
    }
    spans
}

/// Locate the JSON payload inside model output
///
/// Returns the first candidate span that is valid JSON, or the most likely
/// span when none is.
pub fn extract_json(text: &str) -> Option<&str> {
    let spans = candidates(text);
    spans
        .iter()
        .find(|span| serde_json::from_str::<serde_json::Value>(span).is_ok())
        .or_else(|| spans.first())
        .copied()
}

/// Parse model output into `T`
///
/// Every candidate span is tried in order, so bracketed prose ahead of the
/// payload does not hide it. The error reported is that of the first span.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let mut first_error = None;
    for span in candidates(text) {
        match serde_json::from_str(span) {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(error = %e, span_len = span.len(), "parse_json: candidate rejected");
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error.map_or(ParseError::NoJson, ParseError::Malformed))
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the info string (e.g. "json") up to the end of the line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// Index of the bracket closing the one at `start`, honouring JSON strings
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
