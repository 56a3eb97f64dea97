//! Planwright - conversational account-plan research client
//!
//! CLI entry point for research sessions and the local plan cache.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use planwright::auth::{AuthProvider, ConfigAuthProvider, UserContext};
use planwright::backend::{HttpBackend, ResearchBackend};
use planwright::cli::{Cli, Command, OutputFormat, PlansCommand};
use planwright::config::Config;
use planwright::repl;
use planwright::domain::AccountPlan;
use planwright::store::{JsonFileStore, PlanRepository, SessionRepository};
use planwright::versions::list_versions;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("planwright")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
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

    let log_file = fs::File::create(log_dir.join("planwright.log")).context("Failed to create log file")?;

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

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    config.validate().context("Invalid configuration")?;
    info!("Planwright loaded config: backend={}", config.backend.base_url);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Chat { plan }) => {
            debug!(?plan, "main: matched Chat command");
            let user = sign_in(&config, cli.user)?;
            repl::run_interactive(&config, user, plan).await
        }
        Some(Command::Plans { command }) => {
            debug!(?command, "main: matched Plans command");
            let user = sign_in(&config, cli.user)?;
            cmd_plans(&config, &user, command)
        }
        Some(Command::Versions { plan_id, format }) => {
            debug!(%plan_id, ?format, "main: matched Versions command");
            let user = sign_in(&config, cli.user)?;
            cmd_versions(&config, &user, &plan_id, format)
        }
        Some(Command::Status { format }) => {
            debug!(?format, "main: matched Status command");
            cmd_status(&config, format).await
        }
        None => {
            debug!("main: no command specified, starting a new chat");
            let user = sign_in(&config, cli.user)?;
            repl::run_interactive(&config, user, None).await
        }
    }
}

/// Resolve the signed-in user from config and `--user`
fn sign_in(config: &Config, user_override: Option<String>) -> Result<UserContext> {
    let provider = ConfigAuthProvider::new(config.user.clone()).with_override(user_override);
    let user = provider
        .current_user()
        .context("Sign in with --user or set user.id in the config file")?;
    info!(user_id = %user.user_id, "sign_in: signed in");
    Ok(user)
}

fn open_store(config: &Config) -> JsonFileStore {
    JsonFileStore::new(config.storage.expanded_dir())
}

/// Plan cache management
fn cmd_plans(config: &Config, user: &UserContext, command: PlansCommand) -> Result<()> {
    debug!(?command, "cmd_plans: called");
    let store = open_store(config);

    match command {
        PlansCommand::List { format } => {
            let plans = store.list_plans(&user.user_id).context("Failed to list plans")?;
            match format {
                OutputFormat::Json => {
                    let rows: Vec<serde_json::Value> = plans
                        .iter()
                        .map(|p| {
                            serde_json::json!({
                                "id": p.id,
                                "title": p.display_title(),
                                "version": p.version,
                                "updatedAt": p.updated_at,
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
                OutputFormat::Text => {
                    if plans.is_empty() {
                        println!("No plans");
                        return Ok(());
                    }
                    println!("{:<40} {:>7}  {}", "ID".bold(), "VERSION".bold(), "TITLE".bold());
                    for plan in &plans {
                        println!("{:<40} {:>7}  {}", plan.id, plan.version, plan.display_title());
                    }
                }
            }
        }
        PlansCommand::Show { plan_id, format } => {
            let plan = store
                .get_plan(&user.user_id, &plan_id)
                .context(format!("Failed to load plan {}", plan_id))?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
                OutputFormat::Text => repl::print_plan(&plan.snapshot()),
            }
        }
        PlansCommand::Delete { plan_id } => {
            store
                .delete_plan(&user.user_id, &plan_id)
                .context(format!("Failed to delete plan {}", plan_id))?;
            // The session record may not exist for plans that were never chatted in
            match store.delete_session(&user.user_id, &plan_id) {
                Err(e) if !e.is_not_found() => return Err(e).context("Failed to delete session record"),
                _ => {}
            }
            println!("Deleted plan {}", plan_id);
        }
        PlansCommand::Duplicate { plan_id } => {
            let copy = store
                .duplicate_plan(&user.user_id, &plan_id)
                .context(format!("Failed to duplicate plan {}", plan_id))?;
            println!("Created {} ({})", copy.id, copy.display_title());
        }
        PlansCommand::Import { file } => {
            let content = fs::read_to_string(&file).context(format!("Failed to read {}", file.display()))?;
            let plan: AccountPlan =
                serde_json::from_str(&content).context(format!("{} is not a plan document", file.display()))?;
            let imported = store
                .import_plan(&user.user_id, plan)
                .context(format!("Failed to import {}", file.display()))?;
            println!(
                "Imported {} ({}) at v{} with {} earlier versions",
                imported.id,
                imported.display_title(),
                imported.version,
                imported.history.len()
            );
        }
    }
    Ok(())
}

/// Version listing for a cached plan
fn cmd_versions(config: &Config, user: &UserContext, plan_id: &str, format: OutputFormat) -> Result<()> {
    debug!(%plan_id, ?format, "cmd_versions: called");
    let store = open_store(config);
    let plan = store
        .get_plan(&user.user_id, plan_id)
        .context(format!("Failed to load plan {}", plan_id))?;
    let versions = list_versions(&plan);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&versions)?),
        OutputFormat::Text => repl::print_versions(&versions, None),
    }
    Ok(())
}

/// Retrieval-index status from the research service
async fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let backend: Arc<dyn ResearchBackend> =
        Arc::new(HttpBackend::from_config(&config.backend).context("Failed to create backend client")?);
    let status = backend
        .rag_status()
        .await
        .context(format!("Failed to reach {}", config.backend.base_url))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Text => {
            println!("{}", "Research service".bright_cyan());
            println!("  {:14} {}", "url".yellow(), config.backend.base_url);
            match status.as_object() {
                Some(fields) => {
                    for (key, value) in fields {
                        let value = match value {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        println!("  {:14} {}", key.yellow(), value);
                    }
                }
                None => println!("  {}", status),
            }
        }
    }
    Ok(())
}
