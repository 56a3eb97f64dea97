//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Planwright - conversational account-plan research client
#[derive(Parser)]
#[command(
    name = "pw",
    about = "Conversational account-plan research client",
    version = env!("CARGO_PKG_VERSION"),
    after_help = after_help(),
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

    /// User id (overrides `user.id` in the config)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start an interactive research session
    Chat {
        /// Open an existing plan instead of starting a new one
        #[arg(short, long)]
        plan: Option<String>,
    },

    /// Manage locally cached plans
    Plans {
        #[command(subcommand)]
        command: PlansCommand,
    },

    /// List the versions of a cached plan
    Versions {
        /// Plan id
        plan_id: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the research service's retrieval-index status
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Plan cache subcommands
#[derive(Debug, Subcommand)]
pub enum PlansCommand {
    /// List cached plans
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one plan
    Show {
        plan_id: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a plan and its session record
    Delete { plan_id: String },

    /// Copy a plan under a new id
    Duplicate { plan_id: String },

    /// Import an exported or legacy plan document (JSON)
    Import {
        /// Path to the plan file
        file: PathBuf,
    },
}

/// Output format for listing commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

/// Path of the log file written by the `pw` binary
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("planwright")
        .join("logs")
        .join("planwright.log")
}

fn after_help() -> String {
    format!("Logs are written to: {}", get_log_path().display())
}
