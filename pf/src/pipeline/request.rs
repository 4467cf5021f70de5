//! Pipeline request and its validation

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::PipelineError;
use super::state::HistoryMessage;
use crate::config::PipelineConfig;

/// One document-generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

impl PipelineRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    /// Reject malformed input before any node runs
    pub fn validate(&self, config: &PipelineConfig) -> Result<(), PipelineError> {
        debug!(prompt_len = self.prompt.len(), history_len = self.history.len(), "PipelineRequest::validate: called");
        if self.prompt.trim().is_empty() {
            return Err(PipelineError::Validation("prompt must not be empty".to_string()));
        }
        let chars = self.prompt.chars().count();
        if chars > config.max_prompt_chars {
            return Err(PipelineError::Validation(format!(
                "prompt is {} characters, limit is {}",
                chars, config.max_prompt_chars
            )));
        }
        if self.history.len() > config.max_history_messages {
            return Err(PipelineError::Validation(format!(
                "history has {} messages, limit is {}",
                self.history.len(),
                config.max_history_messages
            )));
        }
        if let Some(index) = self.history.iter().position(|m| m.content.trim().is_empty()) {
            return Err(PipelineError::Validation(format!("history message {} has empty content", index)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_valid_request() {
        let request = PipelineRequest::new("a bakery website")
            .with_history(vec![HistoryMessage::new(Role::User, "hello")]);
        assert!(request.validate(&PipelineConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_blank_prompt() {
        let err = PipelineRequest::new("  \n").validate(&PipelineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("prompt must not be empty"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rejects_long_prompt() {
        let config = PipelineConfig {
            max_prompt_chars: 10,
            ..PipelineConfig::default()
        };
        assert!(PipelineRequest::new("x".repeat(11)).validate(&config).is_err());
    }

    #[test]
    fn test_rejects_bad_history() {
        let config = PipelineConfig {
            max_history_messages: 1,
            ..PipelineConfig::default()
        };
        let two = vec![HistoryMessage::new(Role::User, "a"), HistoryMessage::new(Role::Assistant, "b")];
        assert!(PipelineRequest::new("ok").with_history(two).validate(&config).is_err());

        let blank = vec![HistoryMessage::new(Role::User, " ")];
        let err = PipelineRequest::new("ok")
            .with_history(blank)
            .validate(&PipelineConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("history message 0"));
    }

    #[test]
    fn test_deserialize_request() {
        let request: PipelineRequest = serde_json::from_str(
            r#"{"prompt": "shop", "history": [{"role": "assistant", "content": "hi", "summary": "greeting"}]}"#,
        )
        .unwrap();
        assert_eq!(request.history[0].role, Role::Assistant);
        assert_eq!(request.history[0].summary.as_deref(), Some("greeting"));

        let bare: PipelineRequest = serde_json::from_str(r#"{"prompt": "shop"}"#).unwrap();
        assert!(bare.history.is_empty());
    }
}
