//! Interactive REPL for Planwright
//!
//! Chat with the research service, watch research progress, browse plan
//! versions and edit the live document with slash commands.

mod helper;
mod session;

pub use helper::ReplHelper;
pub use session::ReplSession;

use std::sync::Arc;

use colored::Colorize;
use eyre::{Context, Result};

use crate::auth::UserContext;
use crate::backend::{HttpBackend, ResearchBackend};
use crate::config::Config;
use crate::domain::PlanSnapshot;
use crate::session::{Repositories, SessionRuntime};
use crate::store::JsonFileStore;
use crate::versions::VersionEntry;

/// Run the interactive REPL
///
/// This is the main entry point for `pw chat`.
pub async fn run_interactive(config: &Config, user: UserContext, plan_id: Option<String>) -> Result<()> {
    let backend: Arc<dyn ResearchBackend> =
        Arc::new(HttpBackend::from_config(&config.backend).context("Failed to create backend client")?);
    let store = Arc::new(JsonFileStore::new(config.storage.expanded_dir()));
    let repos = Repositories::shared(store);

    let handle = SessionRuntime::spawn(user.clone(), backend, repos.clone(), config.research.clone());

    let mut session = ReplSession::new(handle.clone(), repos.plans, user);
    let result = session.run(plan_id).await;

    // Sign-out; the actor may already be gone
    let _ = handle.shutdown().await;
    result
}

/// Print a plan document for the terminal
pub fn print_plan(plan: &PlanSnapshot) {
    println!();
    println!("{} {}", plan.display_title().bold(), format!("(v{})", plan.version).dimmed());
    if !plan.company.is_empty() {
        println!("  {:10} {}", "company".yellow(), plan.company);
    }
    if !plan.goal.is_empty() {
        println!("  {:10} {}", "goal".yellow(), plan.goal);
    }
    if let Some(updated) = &plan.updated_at {
        println!("  {:10} {}", "updated".yellow(), updated);
    }

    if plan.sections.is_empty() {
        println!("{}", "  No sections yet.".dimmed());
    }
    for (i, section) in plan.sections.iter().enumerate() {
        println!();
        println!("{}", format!("{}. {}", i + 1, section.title).bright_cyan());
        for line in section.content.render().lines() {
            println!("   {}", line);
        }
    }

    let open: Vec<_> = plan.conflicts.iter().filter(|c| !c.is_resolved()).collect();
    if !open.is_empty() {
        println!();
        println!("{}", "Unresolved conflicts:".yellow());
        for conflict in open {
            match &conflict.source {
                Some(source) => println!("  - {} ({})", conflict.description, source.dimmed()),
                None => println!("  - {}", conflict.description),
            }
        }
    }
    println!();
}

/// Print a version listing; `viewing` marks the displayed version
pub fn print_versions(versions: &[VersionEntry], viewing: Option<u32>) {
    if versions.is_empty() {
        println!("{}", "No versions.".dimmed());
        return;
    }
    for entry in versions {
        let marker = if viewing == Some(entry.version) { "*" } else { " " };
        let current = if entry.is_current { " (current)".green().to_string() } else { String::new() };
        println!(
            "{} {:>4}  {}{}  {}",
            marker,
            format!("v{}", entry.version).yellow(),
            entry.title,
            current,
            format!(
                "{} sections{}",
                entry.section_count,
                entry.updated_at.as_deref().map(|u| format!(", {}", u)).unwrap_or_default()
            )
            .dimmed(),
        );
    }
}
