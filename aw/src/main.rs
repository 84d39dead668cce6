//! agentwire - streaming tool-calling model sessions
//!
//! CLI entry point: serve the SSE endpoint, run a session in the terminal, or
//! replay a recorded one.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use agentwire::cli::{Cli, Command, generate_after_help, get_log_path};
use agentwire::config::{Config, LlmConfig};
use agentwire::events::{
    Event, EventKind, EventLogger, TraceMirror, create_event_bus, read_session_events, reconstruct_entries,
};
use agentwire::llm::{Message, ModelInvoker, create_provider};
use agentwire::r#loop::{LoopConfig, StopCondition, StreamSession, ToolExecutionLoop};
use agentwire::tools::ToolRegistry;
use agentwire::transport;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialized yet, so nothing here can be traced
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentwire")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
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

    let log_file = fs::File::create(log_dir.join("agentwire.log")).context("Failed to create log file")?;

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
    let cmd = Cli::command().after_help(generate_after_help(&LlmConfig::default().api_key_env));
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "agentwire loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Serve { bind } => cmd_serve(config, bind).await,
        Command::Ask { prompt, budget, system } => cmd_ask(&config, &prompt, budget, system).await,
        Command::Replay { session_id, events_dir } => cmd_replay(&config, &session_id, events_dir),
        Command::Tools => cmd_tools(),
        Command::Logs { lines } => cmd_logs(lines),
    }
}

async fn cmd_serve(mut config: Config, bind: Option<String>) -> Result<()> {
    debug!(?bind, "cmd_serve: called");
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    config.validate()?;
    println!("agentwire listening on http://{}", config.server.bind);
    transport::serve(&config).await
}

/// Run one session with content on stdout and tool activity on stderr
async fn cmd_ask(config: &Config, prompt: &str, budget: Option<u32>, system: Option<String>) -> Result<()> {
    debug!(%prompt, ?budget, "cmd_ask: called");
    config.validate()?;

    let provider = create_provider(&config.llm)?;
    let loop_config = LoopConfig::from(&config.loop_config);
    let invoker = ModelInvoker::new(provider, config.llm.model_parameters()).with_chunk_buffer(loop_config.chunk_buffer);

    let bus = create_event_bus();
    bus.on_fn(EventKind::Content, |event| {
        if let Event::Content { text } = event {
            print!("{}", text);
            std::io::stdout().flush()?;
        }
        Ok(())
    });
    bus.on_fn(EventKind::ToolCall, |event| {
        if let Event::ToolCall(call) = event {
            eprintln!("\n{} {} {}", "\u{2192}".cyan(), call.name.bold(), call.args.to_string().dimmed());
        }
        Ok(())
    });
    bus.on_fn(EventKind::ToolResult, |event| {
        if let Event::ToolResult(result) = event {
            let marker = if result.is_error() { "\u{2717}".red() } else { "\u{2713}".green() };
            eprintln!("{} {}", marker, result.tool_name);
        }
        Ok(())
    });
    bus.on_fn(EventKind::Log, |event| {
        if let Event::Log { message } = event {
            eprintln!("{}", message.yellow());
        }
        Ok(())
    });
    bus.on_fn(EventKind::Error, |event| {
        if let Event::Error { message } = event {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
        Ok(())
    });
    TraceMirror::attach(&bus);

    let mut history = Vec::new();
    if let Some(system) = system {
        history.push(Message::system(system));
    }
    history.push(Message::user(prompt));
    let mut session = StreamSession::new(history, budget.unwrap_or(loop_config.loop_budget));

    let logger = if config.events.enabled {
        Some(EventLogger::attach(&bus, &config.events.dir, &session.id)?)
    } else {
        None
    };

    let cancel = session.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let engine = ToolExecutionLoop::new(invoker, ToolRegistry::standard(), bus);
    let outcome = engine.run(&mut session).await;
    if let Some(logger) = logger {
        logger.close();
    }
    let result = outcome?;
    println!();

    let stop = match result.stop {
        StopCondition::Completed => None,
        StopCondition::BudgetExhausted => Some("tool budget exhausted"),
        StopCondition::ForcedResponse => Some("answer forced by tool"),
        StopCondition::RateLimited => Some("rate limited"),
        StopCondition::Aborted => Some("aborted"),
    };
    if let Some(stop) = stop {
        eprintln!("{}", format!("[{}]", stop).dimmed());
    }
    eprintln!(
        "{}",
        format!(
            "session {} | rounds {} | tokens {}",
            result.session_id,
            result.loop_count,
            result.usage.total()
        )
        .dimmed()
    );
    Ok(())
}

/// Print the message rebuilt from a session's event log
fn cmd_replay(config: &Config, session_id: &str, events_dir: Option<PathBuf>) -> Result<()> {
    debug!(%session_id, ?events_dir, "cmd_replay: called");
    let dir = events_dir.unwrap_or_else(|| config.events.dir.clone());
    let entries = read_session_events(&dir, session_id)?;
    if entries.is_empty() {
        eyre::bail!("No events recorded for session {} in {}", session_id, dir.display());
    }

    let message = reconstruct_entries(&entries);
    println!("{}", serde_json::to_string_pretty(&message)?);
    Ok(())
}

fn cmd_tools() -> Result<()> {
    debug!("cmd_tools: called");
    for spec in ToolRegistry::standard().specs() {
        println!("{:<14} {}", spec.name.bold(), spec.description);
    }
    Ok(())
}

/// Show the last N lines of the log file
fn cmd_logs(lines: usize) -> Result<()> {
    debug!(lines, "cmd_logs: called");
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let all_lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }
    Ok(())
}
