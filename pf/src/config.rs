//! PlanForge configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::pipeline::Complexity;

/// Main PlanForge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub log_level: Option<String>,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Pipeline budgets, thresholds and limits
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Validate configuration values before use
    pub fn validate(&self) -> Result<()> {
        debug!("Config::validate: called");
        self.pipeline.validate()
    }

    /// Check that the LLM API key environment variable is set
    ///
    /// Call this early in startup to fail fast with a clear error message.
    pub fn validate_credentials(&self) -> Result<()> {
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_locations() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed: a broken config file is reported properly by
    /// `load` once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::default_locations(),
        };
        candidates
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    /// Project-local then user config locations
    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(".planforge.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            locations.push(config_dir.join("planforge").join("planforge.yml"));
        }
        locations
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LlmConfig {
    /// Provider name ("openai" or "openai-compatible")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    pub api_key_env: String,

    /// API base URL
    pub base_url: String,

    /// Hard cap on tokens per response, regardless of what a node asks for
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 120_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .map_err(|_| eyre::eyre!("API key environment variable {} is not set", self.api_key_env))
    }
}

/// Pipeline budgets, thresholds and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Node executions allowed per run
    pub max_steps: u32,

    /// Retries allowed per run before salvage or failure
    pub max_retries: u32,

    /// Re-asks when the model returns unparseable structured output
    pub parse_retries: u32,

    /// Longest accepted prompt, in characters
    pub max_prompt_chars: usize,

    /// Most history messages accepted in one request
    pub max_history_messages: usize,

    /// Temperature for analysis calls (intent, classification, planning)
    pub analysis_temperature: f32,

    /// Temperature for content generation
    pub generation_temperature: f32,

    pub retry: RetryConfig,
    pub intent: IntentConfig,
    pub sections: SectionConfig,
    pub context: ContextConfig,
    pub aggregator: AggregatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_retries: 3,
            parse_retries: 1,
            max_prompt_chars: 20_000,
            max_history_messages: 100,
            analysis_temperature: 0.2,
            generation_temperature: 0.7,
            retry: RetryConfig::default(),
            intent: IntentConfig::default(),
            sections: SectionConfig::default(),
            context: ContextConfig::default(),
            aggregator: AggregatorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            eyre::bail!("pipeline.max-steps must be at least 1");
        }
        for (name, value) in [
            ("intent.clear-confidence", self.intent.clear_confidence),
            ("intent.defaults-confidence", self.intent.defaults_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                eyre::bail!("pipeline.{} must be within [0, 1], got {}", name, value);
            }
        }
        if self.intent.defaults_confidence > self.intent.clear_confidence {
            eyre::bail!("pipeline.intent.defaults-confidence must not exceed clear-confidence");
        }
        if self.sections.min_output_tokens > self.sections.max_output_tokens {
            eyre::bail!(
                "pipeline.sections.min-output-tokens ({}) exceeds max-output-tokens ({})",
                self.sections.min_output_tokens,
                self.sections.max_output_tokens
            );
        }
        if self.sections.max_sections == 0 || self.sections.min_sections > self.sections.max_sections {
            eyre::bail!("pipeline.sections: need 0 < min-sections <= max-sections");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            eyre::bail!("pipeline.retry.base-delay-ms exceeds max-delay-ms");
        }
        Ok(())
    }
}

/// Retry backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Intent analysis thresholds and defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IntentConfig {
    /// Confidence at or above which intent is clear outright
    pub clear_confidence: f64,

    /// Confidence at or above which intent is clear if defaults may be used
    pub defaults_confidence: f64,

    /// Word count the heuristic fallback treats as detailed enough
    pub min_words: usize,

    /// Response budget for the analysis call
    pub max_tokens: u32,

    /// Phrases that skip clarification entirely (case-insensitive)
    pub bypass_phrases: Vec<String>,

    /// Complexity assumed until classification lands
    pub default_complexity: Complexity,

    /// Tech stack suggested when nothing else is known
    pub default_tech_stack: Vec<String>,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            clear_confidence: 0.7,
            defaults_confidence: 0.5,
            min_words: 8,
            max_tokens: 600,
            bypass_phrases: [
                "use defaults",
                "use default",
                "use sensible defaults",
                "you decide",
                "up to you",
                "your call",
                "skip clarification",
                "skip the questions",
                "no questions",
                "just build it",
                "just generate",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            default_complexity: Complexity::Moderate,
            default_tech_stack: vec!["React".to_string(), "Node.js".to_string(), "PostgreSQL".to_string()],
        }
    }
}

/// Section planning and generation budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SectionConfig {
    /// Fewest sections the planner is asked for
    pub min_sections: usize,

    /// Most sections kept from a plan
    pub max_sections: usize,

    /// Response budget for the planning call
    pub planner_max_tokens: u32,

    /// Most recent sections passed verbatim to the next section
    pub verbatim_recent: usize,

    /// Character cap on each verbatim section
    pub verbatim_max_chars: usize,

    /// Character cap on previews of older sections
    pub preview_chars: usize,

    /// Token budget for older-section previews
    pub context_token_budget: u32,

    /// Lower clamp of the per-section output budget
    pub min_output_tokens: u32,

    /// Upper clamp of the per-section output budget
    pub max_output_tokens: u32,

    pub multipliers: ComplexityMultipliers,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            min_sections: 5,
            max_sections: 12,
            planner_max_tokens: 2000,
            verbatim_recent: 2,
            verbatim_max_chars: 4000,
            preview_chars: 300,
            context_token_budget: 3000,
            min_output_tokens: 2000,
            max_output_tokens: 8000,
            multipliers: ComplexityMultipliers::default(),
        }
    }
}

/// Output-budget multipliers per complexity tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ComplexityMultipliers {
    pub simple: f64,
    pub moderate: f64,
    pub complex: f64,
}

impl Default for ComplexityMultipliers {
    fn default() -> Self {
        Self {
            simple: 1.5,
            moderate: 2.5,
            complex: 4.0,
        }
    }
}

impl ComplexityMultipliers {
    pub fn for_tier(&self, complexity: Complexity) -> f64 {
        match complexity {
            Complexity::Simple => self.simple,
            Complexity::Moderate => self.moderate,
            Complexity::Complex => self.complex,
        }
    }
}

/// Conversation context limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ContextConfig {
    /// Most recent messages included verbatim
    pub recent_messages: usize,

    /// Character cap on each verbatim message
    pub max_message_chars: usize,

    /// History size above which older messages are summarised
    pub history_token_budget: u32,

    /// Response budget for summarisation calls
    pub summary_max_tokens: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            recent_messages: 6,
            max_message_chars: 2000,
            history_token_budget: 1500,
            summary_max_tokens: 400,
        }
    }
}

/// Aggregation budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AggregatorConfig {
    /// Response budget for the polished document
    pub max_tokens: u32,

    /// Response budget for the closing summary
    pub summary_max_tokens: u32,

    /// Document size above which it is condensed before summarising
    pub summary_input_tokens: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_tokens: 16_000,
            summary_max_tokens: 300,
            summary_input_tokens: 6000,
        }
    }
}
