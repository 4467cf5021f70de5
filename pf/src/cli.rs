//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// PlanForge - adaptive project-plan generator
#[derive(Parser)]
#[command(
    name = "pf",
    about = "Turn a project idea into a planned, section-by-section document",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a project document from a request
    Generate {
        /// What to plan, in plain words
        prompt: String,

        /// JSON file with earlier conversation: [{"role", "content", "summary"?}]
        #[arg(long, value_name = "FILE")]
        history: Option<PathBuf>,

        /// Output format (markdown, json)
        #[arg(short, long, default_value = "markdown")]
        format: OutputFormat,

        /// Write the result to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Override the step budget
        #[arg(long)]
        max_steps: Option<u32>,

        /// Override the retry budget
        #[arg(long)]
        max_retries: Option<u32>,

        /// Do not print progress to stderr
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the resolved configuration as YAML
    Config,
}

/// Where the log file lives
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("planforge")
        .join("logs")
        .join("planforge.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Output format for generated documents
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "markdown" | "md" | "text" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: markdown or json", s))
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate() {
        let cli = Cli::try_parse_from([
            "pf",
            "generate",
            "a bakery website",
            "--format",
            "json",
            "--max-steps",
            "10",
            "-l",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Generate {
                prompt,
                format,
                max_steps,
                max_retries,
                ..
            } => {
                assert_eq!(prompt, "a bakery website");
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(max_steps, Some(10));
                assert_eq!(max_retries, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("MD".parse::<OutputFormat>(), Ok(OutputFormat::Markdown));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_log_path_is_under_planforge() {
        assert!(get_log_path().ends_with("planforge/logs/planforge.log"));
    }
}
