//! PlanForge - adaptive project-plan generator
//!
//! CLI entry point: loads configuration, wires the model client into the
//! pipeline and prints the result.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use planforge::cli::{Cli, Command, OutputFormat, get_log_path};
use planforge::config::Config;
use planforge::context::ContextSummarizer;
use planforge::events::{EventBus, PipelineEvent};
use planforge::llm::create_client;
use planforge::pipeline::{HistoryMessage, Orchestrator, PipelineRequest, PipelineResponse};
use planforge::prompts::PromptLoader;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(model = %config.llm.model, "PlanForge loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Generate {
            prompt,
            history,
            format,
            output,
            max_steps,
            max_retries,
            quiet,
        } => {
            let options = GenerateOptions {
                history,
                format,
                output,
                max_steps,
                max_retries,
                quiet,
            };
            cmd_generate(config, prompt, options).await
        }
        Command::Config => cmd_config(&config),
    }
}

struct GenerateOptions {
    history: Option<PathBuf>,
    format: OutputFormat,
    output: Option<PathBuf>,
    max_steps: Option<u32>,
    max_retries: Option<u32>,
    quiet: bool,
}

async fn cmd_generate(config: Config, prompt: String, options: GenerateOptions) -> Result<()> {
    debug!(format = %options.format, ?options.history, "cmd_generate: called");
    let mut pipeline = config.pipeline.clone();
    if let Some(max_steps) = options.max_steps {
        pipeline.max_steps = max_steps;
    }
    if let Some(max_retries) = options.max_retries {
        pipeline.max_retries = max_retries;
    }
    pipeline.validate().context("Invalid pipeline options")?;

    let history = match &options.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    let request = PipelineRequest::new(prompt).with_history(history);
    if let Err(e) = request.validate(&pipeline) {
        eyre::bail!("{}", e);
    }

    config.validate_credentials()?;
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let prompts = Arc::new(PromptLoader::new(cwd));
    let summarizer = Arc::new(ContextSummarizer::new(llm.clone(), pipeline.context.clone()).with_prompts(prompts.clone()));
    let bus = Arc::new(EventBus::with_default_capacity());
    let orchestrator = Orchestrator::new(llm, pipeline)
        .map_err(|e| eyre::eyre!("Failed to build pipeline: {}", e))?
        .with_prompts(prompts)
        .with_summarizer(summarizer)
        .with_event_bus(bus.clone());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("cmd_generate: interrupted, cancelling run");
                eprintln!("{}", "Interrupted, stopping after the current step...".yellow());
                cancel.cancel();
            }
        }
    });

    let printer = (!options.quiet).then(|| tokio::spawn(print_progress(bus.subscribe())));
    drop(bus);

    let response = orchestrator.execute(request, cancel).await;
    drop(orchestrator);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let rendered = render_response(&response, options.format)?;
    match &options.output {
        Some(path) => {
            fs::write(path, &rendered).context(format!("Failed to write {}", path.display()))?;
            eprintln!("{} {}", "Wrote".green(), path.display());
        }
        None => println!("{}", rendered),
    }

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

fn load_history(path: &Path) -> Result<Vec<HistoryMessage>> {
    debug!(?path, "load_history: called");
    let content = fs::read_to_string(path).context(format!("Failed to read history file {}", path.display()))?;
    serde_json::from_str(&content).context("History file must be a JSON array of {role, content, summary?}")
}

fn render_response(response: &PipelineResponse, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(response).context("Failed to serialize response");
    }
    if let Some(data) = &response.data {
        return Ok(data.markdown.clone());
    }
    if let Some(questions) = &response.clarification_questions {
        let mut text = String::from("Before planning, please answer:\n");
        for (i, question) in questions.iter().enumerate() {
            text.push_str(&format!("\n{}. {}", i + 1, question));
        }
        return Ok(text);
    }
    Ok(response.message.clone().unwrap_or_else(|| "Generation failed".to_string()))
}

/// Render run progress on stderr until the run halts
async fn print_progress(mut rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match &event {
            PipelineEvent::RunStarted { run_id, .. } => {
                eprintln!("{} {}", "Run".bold(), run_id.dimmed());
            }
            PipelineEvent::NodeStarted { node, step, .. } => {
                eprintln!("{} {}", format!("[{:>2}]", step + 1).dimmed(), node.name().cyan());
            }
            PipelineEvent::NodeCompleted { node, failed: true, .. } => {
                eprintln!("     {} {}", "failed:".red(), node.name());
            }
            PipelineEvent::SectionGenerated { title, order, total, .. } => {
                eprintln!("     {} {} ({}/{})", "wrote".green(), title, order, total);
            }
            PipelineEvent::RetryScheduled {
                target, attempt, delay_ms, ..
            } => {
                eprintln!(
                    "     {} {} in {}ms (attempt {})",
                    "retrying".yellow(),
                    target.name(),
                    delay_ms,
                    attempt
                );
            }
            PipelineEvent::RunHalted {
                outcome,
                success,
                steps,
                total_tokens,
                ..
            } => {
                let outcome = if *success { outcome.green() } else { outcome.red() };
                eprintln!("{} {} after {} steps, {} tokens", "Done:".bold(), outcome, steps, total_tokens);
                break;
            }
            PipelineEvent::NodeCompleted { .. } => {}
        }
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
