//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// agentwire - streaming tool-calling model sessions over SSE
#[derive(Parser)]
#[command(
    name = "aw",
    about = "Streaming, tool-orchestrating model invocation engine",
    version = env!("CARGO_PKG_VERSION"),
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
    /// Serve the SSE chat endpoint
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run one session in the terminal
    Ask {
        /// User prompt
        prompt: String,

        /// Maximum tool rounds (overrides loop.budget)
        #[arg(short, long)]
        budget: Option<u32>,

        /// Optional system prompt
        #[arg(short, long)]
        system: Option<String>,
    },

    /// Rebuild the assistant message of a recorded session
    Replay {
        /// Session ID
        session_id: String,

        /// Directory holding session event logs (overrides events.dir)
        #[arg(short, long)]
        events_dir: Option<PathBuf>,
    },

    /// List the tools offered to the model
    Tools,

    /// Show the last lines of the log file
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentwire")
        .join("logs")
        .join("agentwire.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with the API key status and log location
pub fn generate_after_help(api_key_env: &str) -> String {
    debug!(%api_key_env, "generate_after_help: called");
    let mut help = String::new();

    help.push_str("Provider:\n");
    let (icon, status) = if std::env::var(api_key_env).is_ok() {
        ("\u{2705}", "set")
    } else {
        ("\u{274C}", "missing")
    };
    help.push_str(&format!("  {} {:<16} {}\n", icon, api_key_env, status));

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}
