//! Prompt Loader
//!
//! Loads prompt templates from a project override directory or falls back to
//! embedded defaults, then renders them with Handlebars.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::embedded;

/// Errors from loading or rendering a template
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template not found: {0}")]
    NotFound(String),

    #[error("failed to read prompt {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render prompt {name}: {source}")]
    Render {
        name: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.planforge/prompts/`)
    user_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that honours `.planforge/prompts/` under `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        let user_dir = root.as_ref().join(".planforge/prompts");
        let exists = user_dir.is_dir();
        debug!(?user_dir, %exists, "PromptLoader::new: called");

        Self {
            hbs: Self::engine(),
            user_dir: exists.then_some(user_dir),
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Prompts are plain text, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks `.planforge/prompts/{name}.pmt` first, then the embedded copy.
    fn load_template(&self, name: &str) -> Result<String, PromptError> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path).map_err(|source| PromptError::Read { path, source });
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| PromptError::NotFound(name.to_string()))
    }

    /// Render a template with the given context
    pub fn render(&self, name: &str, context: &impl Serialize) -> Result<String, PromptError> {
        debug!(%name, "PromptLoader::render: called");
        let template = self.load_template(name)?;
        self.hbs
            .render_template(&template, context)
            .map(|rendered| rendered.trim().to_string())
            .map_err(|source| PromptError::Render {
                name: name.to_string(),
                source: Box::new(source),
            })
    }
}

impl Default for PromptLoader {
    fn default() -> Self {
        Self::embedded_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_embedded_summary() {
        let loader = PromptLoader::embedded_only();
        let out = loader.render("summary", &json!({"max_words": 60})).unwrap();
        assert!(out.contains("60 words"));
    }

    #[test]
    fn test_render_does_not_html_escape() {
        let loader = PromptLoader::embedded_only();
        let out = loader
            .render(
                "section",
                &json!({"project_request": "a <b> & \"c\"", "title": "Intro", "position": 1, "total": 3}),
            )
            .unwrap();
        assert!(out.contains("a <b> & \"c\""));
    }

    #[test]
    fn test_render_iterates_lists() {
        let loader = PromptLoader::embedded_only();
        let out = loader
            .render(
                "clarify",
                &json!({"missing_info": ["target users", "budget"], "min_questions": 2, "max_questions": 4}),
            )
            .unwrap();
        assert!(out.contains("- target users"));
        assert!(out.contains("- budget"));
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(matches!(loader.render("nope", &json!({})), Err(PromptError::NotFound(_))));
    }

    #[test]
    fn test_user_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let prompts = dir.path().join(".planforge/prompts");
        std::fs::create_dir_all(&prompts).unwrap();
        std::fs::write(prompts.join("summary.pmt"), "custom {{max_words}}").unwrap();

        let loader = PromptLoader::new(dir.path());
        assert_eq!(loader.render("summary", &json!({"max_words": 5})).unwrap(), "custom 5");
        // Templates without an override still come from the embedded set
        assert!(loader.render("history", &json!({"max_words": 5})).is_ok());
    }
}
