//! te - agent tool execution CLI
//!
//! Runs single tool calls, serves a JSON-lines stream of them, and inspects
//! the persisted edit history.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use toolexec::cli::{Cli, Command, HistoryCommand};
use toolexec::config::Config;
use toolexec::tools::{ArgBag, Dispatcher, EditHistory, Outcome, ToolContext, ToolError};

fn setup_logging(level: tracing::Level) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolexec")
        .join("logs");

    // Tool output owns stdout; fall back to stderr when the log file is unavailable
    let log_file = fs::create_dir_all(&log_dir).and_then(|_| {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("toolexec.log"))
    });
    match log_file {
        Ok(file) => tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init(),
    }

    info!("Logging initialized (level: {})", level);
    Ok(())
}

/// CLI flag wins over config, config over INFO
fn resolve_level(cli_level: Option<&str>, config_level: Option<&str>) -> tracing::Level {
    cli_level
        .or(config_level)
        .and_then(|level| level.parse().ok())
        .unwrap_or(tracing::Level::INFO)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(resolve_level(cli.log_level.as_deref(), config.log_level.as_deref()))
        .context("Failed to setup logging")?;

    if let Some(history_file) = &cli.history_file {
        config.history_file = history_file.clone();
    }
    let cwd = match &cli.cwd {
        Some(cwd) => cwd.clone(),
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let cwd = cwd
        .canonicalize()
        .context(format!("Working directory {} is not accessible", cwd.display()))?;

    info!(?cwd, history_file = ?config.history_file, "te starting");

    match cli.command {
        Command::Call { tool, args } => cmd_call(&config, cwd, &tool, &args).await,
        Command::Serve => cmd_serve(&config, cwd).await,
        Command::History { command } => match command {
            HistoryCommand::List => cmd_history_list(&config).await,
            HistoryCommand::Clear { path } => cmd_history_clear(&config, cwd, path).await,
        },
        Command::Schema => cmd_schema(&config, cwd),
    }
}

/// Run one tool call and report it the way agents expect
async fn cmd_call(config: &Config, cwd: PathBuf, tool: &str, args: &[String]) -> Result<ExitCode> {
    debug!(%tool, ?args, "cmd_call: called");
    let mut dispatcher = Dispatcher::new(config, cwd);

    let outcome = match ArgBag::from_cli_args(args) {
        Ok(args) => dispatcher.dispatch(tool, &args).await,
        Err(e) => Outcome::from(Err(e)),
    };
    dispatcher.shutdown().await;

    info!(%tool, kind = outcome.kind(), "Tool call finished");
    println!("Tool Call Status: {}", outcome.status_code());
    println!("{}", outcome.render());
    Ok(ExitCode::from(outcome.exit_code()))
}

#[derive(Debug, Deserialize)]
struct ServeRequest {
    tool: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ServeResponse<'a> {
    status: i32,
    kind: &'a str,
    output: String,
}

/// JSON-lines loop; one dispatcher for the whole stream so the shell session persists
async fn cmd_serve(config: &Config, cwd: PathBuf) -> Result<ExitCode> {
    debug!("cmd_serve: called");
    let mut dispatcher = Dispatcher::new(config, cwd);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<ServeRequest>(&line) {
            Ok(request) => {
                dispatcher
                    .dispatch(&request.tool, &ArgBag::from_json(&request.args))
                    .await
            }
            Err(e) => {
                warn!(%e, "cmd_serve: malformed request line");
                Outcome::Rejected(ToolError::InvalidArgument(format!("malformed request: {}", e)))
            }
        };

        let response = ServeResponse {
            status: outcome.status_code(),
            kind: outcome.kind(),
            output: outcome.render(),
        };
        let mut text = serde_json::to_string(&response).context("Failed to encode response")?;
        text.push('\n');
        stdout.write_all(text.as_bytes()).await.context("Failed to write response")?;
        stdout.flush().await.context("Failed to write response")?;
    }

    info!("Request stream closed, shutting down");
    dispatcher.shutdown().await;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_history_list(config: &Config) -> Result<ExitCode> {
    let file = &config.history_file;
    let history = EditHistory::load(file)
        .await
        .context(format!("Failed to load edit history from {}", file.display()))?;

    if history.is_empty() {
        println!("No edit history in {}", file.display());
        return Ok(ExitCode::SUCCESS);
    }

    println!("Edit history: {}", file.display().to_string().cyan());
    for (path, stack) in history.iter() {
        let last = stack
            .last()
            .map(|snapshot| {
                snapshot
                    .taken_at
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_default();
        println!(
            "  {} {} {}",
            path.display().to_string().cyan(),
            format!("depth={}", stack.len()).yellow(),
            last.dimmed()
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_history_clear(config: &Config, cwd: PathBuf, path: Option<PathBuf>) -> Result<ExitCode> {
    let file = &config.history_file;
    let mut history = EditHistory::load(file)
        .await
        .context(format!("Failed to load edit history from {}", file.display()))?;

    match path {
        Some(path) => {
            let key = ToolContext::new(cwd).normalize_path(&path);
            let cleared = history.clear(&key);
            println!("{} Cleared {} snapshot(s) for {}", "✓".green(), cleared, key.display());
        }
        None => {
            history.clear_all();
            println!("{} Cleared all edit history", "✓".green());
        }
    }

    history
        .save(file)
        .await
        .context(format!("Failed to save edit history to {}", file.display()))?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_schema(config: &Config, cwd: PathBuf) -> Result<ExitCode> {
    let dispatcher = Dispatcher::new(config, cwd);
    let schema = serde_json::to_string_pretty(&dispatcher.definitions()).context("Failed to encode schema")?;
    println!("{}", schema);
    Ok(ExitCode::SUCCESS)
}
