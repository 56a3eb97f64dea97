//! REPL session management

use std::collections::HashSet;
use std::sync::Arc;

use colored::Colorize;
use eyre::Result;
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::helper::ReplHelper;
use super::{print_plan, print_versions};
use crate::artifact::ViewPointer;
use crate::auth::UserContext;
use crate::domain::{ChatMessage, ContentEdit, ContentPath, ResearchProgress, ResearchStatus, Role, SectionContent};
use crate::session::{SessionError, SessionEvent, SessionHandle, SessionResponse};
use crate::store::PlanRepository;

/// Interactive REPL session
pub struct ReplSession {
    handle: SessionHandle,
    plans: Arc<dyn PlanRepository>,
    user: UserContext,
    helper: ReplHelper,
    /// Transcript message ids already on screen
    shown: HashSet<String>,
    /// Last progress line printed, to avoid repeats
    last_progress: Option<(u32, String)>,
}

impl ReplSession {
    /// Create a new REPL session
    pub fn new(handle: SessionHandle, plans: Arc<dyn PlanRepository>, user: UserContext) -> Self {
        Self {
            handle,
            plans,
            user,
            helper: ReplHelper::new(),
            shown: HashSet::new(),
            last_progress: None,
        }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self, plan_id: Option<String>) -> Result<()> {
        self.print_welcome();

        if let Some(plan_id) = plan_id {
            self.open_plan(&plan_id).await;
        } else {
            self.print_transcript(false).await;
        }

        let mut rl: Editor<ReplHelper, DefaultHistory> =
            Editor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;
        rl.set_helper(Some(self.helper.clone()));

        loop {
            self.refresh_completions().await;
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }

                    let _ = rl.add_history_entry(input);

                    if input.starts_with('/') {
                        match self.handle_slash_command(input).await {
                            SlashResult::Continue => continue,
                            SlashResult::Quit => break,
                        }
                    } else {
                        self.process_user_input(input).await;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Send one chat message and follow any research run it starts
    async fn process_user_input(&mut self, input: &str) {
        debug!(len = input.len(), "process_user_input: called");

        if let Some(attached) = report(self.handle.attach_mentioned(input).await) {
            for file in attached {
                println!("{} {}", "+".green(), file.filename.dimmed());
            }
        }

        // Subscribe before sending so no progress event is missed
        let mut events = self.handle.subscribe();
        self.last_progress = None;

        match self.handle.send_message(input).await {
            Ok(status) => {
                self.print_transcript(false).await;
                if status == ResearchStatus::Researching {
                    self.follow_research(&mut events).await;
                }
            }
            Err(SessionError::Busy) => {
                println!("{}", "Still working on the previous message.".yellow());
            }
            Err(SessionError::Backend(e)) => {
                debug!(error = %e, "process_user_input: backend failure");
                self.print_transcript(false).await;
            }
            Err(e) => print_error(&e),
        }
    }

    /// Print progress and new messages until the research run ends
    ///
    /// Ctrl+C stops following; continuations keep running in the background.
    async fn follow_research(&mut self, events: &mut broadcast::Receiver<SessionEvent>) {
        debug!("follow_research: called");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(SessionEvent::ProgressUpdated { progress: Some(progress) }) => self.print_progress(&progress),
                    Ok(SessionEvent::TranscriptChanged { .. }) => self.print_transcript(false).await,
                    Ok(SessionEvent::ResearchStatusChanged { status }) if status.is_terminal() => {
                        self.print_transcript(false).await;
                        break;
                    }
                    Ok(SessionEvent::PlanProposed { tasks }) => {
                        println!("{}", "Proposed research plan:".bright_cyan());
                        for (i, task) in tasks.iter().enumerate() {
                            println!("  {}. {}", i + 1, task.task);
                        }
                    }
                    Ok(SessionEvent::DocumentChanged { version: Some(version), .. }) => {
                        println!("{}", format!("Plan updated to v{}", version).dimmed());
                    }
                    Ok(SessionEvent::Error { message }) => {
                        self.print_transcript(false).await;
                        println!("{} {}", "!".red(), message);
                        break;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "follow_research: lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    println!("{}", "Research continues in the background; use /status to check on it.".dimmed());
                    break;
                }
            }
        }
    }

    fn print_progress(&mut self, progress: &ResearchProgress) {
        let key = (progress.current_step, progress.label.clone());
        if self.last_progress.as_ref() == Some(&key) {
            return;
        }
        println!(
            "{} {}",
            format!("[{}/{}]", progress.current_step, progress.total_steps).bright_blue(),
            progress.label.dimmed()
        );
        self.last_progress = Some(key);
    }

    /// Print transcript messages not yet on screen
    ///
    /// With `include_user` false, user messages are only marked as shown
    /// since the user typed them.
    async fn print_transcript(&mut self, include_user: bool) {
        let Some(snapshot) = report(self.handle.snapshot().await) else {
            return;
        };
        for msg in &snapshot.transcript {
            if !self.shown.insert(msg.id.clone()) {
                continue;
            }
            if msg.role == Role::User && !include_user {
                continue;
            }
            print_message(msg);
        }
    }

    async fn refresh_completions(&self) {
        if let Ok(files) = self.handle.files().await {
            let mut all = files.pending;
            all.extend(files.known);
            self.helper.set_files(all);
        }
    }

    async fn open_plan(&mut self, plan_id: &str) {
        debug!(%plan_id, "open_plan: called");
        match self.handle.open_plan(plan_id).await {
            Ok(()) => {
                self.shown.clear();
                println!("{}", format!("Opened plan {}", plan_id).dimmed());
                self.print_transcript(true).await;
            }
            Err(e) => print_error(&e),
        }
    }

    /// Print welcome message
    fn print_welcome(&self) {
        println!();
        println!("{}", "Planwright Account Plan Research".bright_cyan().bold());
        println!("Signed in as: {}", self.user.display_name());
        println!(
            "Type {} for help, {} to quit, {} to reference an attached file",
            "/help".yellow(),
            "/quit".yellow(),
            "@".yellow()
        );
        println!();
    }

    /// Handle slash commands
    async fn handle_slash_command(&mut self, input: &str) -> SlashResult {
        let (cmd, rest) = split_command(input);
        debug!(%cmd, %rest, "handle_slash_command: called");

        match cmd {
            "/help" | "/h" => self.print_help(),
            "/quit" | "/q" | "/exit" => return SlashResult::Quit,
            "/new" => {
                if report(self.handle.new_plan().await).is_some() {
                    self.shown.clear();
                    self.print_transcript(true).await;
                }
            }
            "/open" => match rest {
                "" => println!("{} /open PLAN_ID", "Usage:".yellow()),
                id => self.open_plan(id).await,
            },
            "/plans" => self.print_plans(),
            "/plan" => match report(self.handle.displayed_plan().await) {
                Some(Some(plan)) => print_plan(&plan),
                Some(None) => println!("{}", "No plan yet. Ask for some research first.".dimmed()),
                None => {}
            },
            "/versions" => {
                let viewing = match self.handle.displayed_plan().await {
                    Ok(Some(plan)) => Some(plan.version),
                    _ => None,
                };
                if let Some(versions) = report(self.handle.versions().await) {
                    print_versions(&versions, viewing);
                }
            }
            "/view" => {
                let version = match rest {
                    "" | "current" => None,
                    v => match v.trim_start_matches('v').parse::<u32>() {
                        Ok(n) => Some(n),
                        Err(_) => {
                            println!("{} /view N|current", "Usage:".yellow());
                            return SlashResult::Continue;
                        }
                    },
                };
                match report(self.handle.select_version(version).await) {
                    Some(ViewPointer::Current) => println!("{}", "Viewing the current version.".dimmed()),
                    Some(ViewPointer::Version(n)) => println!("{}", format!("Viewing v{}.", n).dimmed()),
                    None => {}
                }
            }
            "/edit" => {
                if let Some(buffer) = report(self.handle.start_edit().await) {
                    let hint = "Editing. /set, /setat, /push, /add, /remove, /rename, /title, then /commit or /cancel.";
                    println!("{}", hint.dimmed());
                    print_plan(&buffer.snapshot());
                }
            }
            "/set" => match parse_index_and_rest(rest) {
                Some((index, value)) if !value.is_empty() => {
                    if report(self.handle.edit_section(index, parse_content(value)).await).is_some() {
                        self.print_buffer().await;
                    }
                }
                _ => println!("{} /set N VALUE", "Usage:".yellow()),
            },
            "/setat" | "/push" => match parse_index_and_rest(rest).map(|(i, r)| (i, split_command(r))) {
                Some((index, (path, value))) if !value.is_empty() => {
                    let edit = match cmd {
                        "/push" => ContentEdit::Push(parse_content(value)),
                        _ => ContentEdit::Replace(parse_content(value)),
                    };
                    self.edit_at(index, path, edit).await;
                }
                _ => println!("{} {} N PATH VALUE", "Usage:".yellow(), cmd),
            },
            "/addkey" => match parse_index_and_rest(rest).map(|(i, r)| (i, split_command(r))) {
                Some((index, (path, r))) => match split_command(r) {
                    (key, value) if !key.is_empty() && !value.is_empty() => {
                        let edit = ContentEdit::InsertKey {
                            key: key.to_string(),
                            value: parse_content(value),
                        };
                        self.edit_at(index, path, edit).await;
                    }
                    _ => println!("{} /addkey N PATH KEY VALUE", "Usage:".yellow()),
                },
                None => println!("{} /addkey N PATH KEY VALUE", "Usage:".yellow()),
            },
            "/unset" => match parse_index_and_rest(rest) {
                Some((index, path)) if !ContentPath::parse(path).is_root() => {
                    self.edit_at(index, path, ContentEdit::Remove).await;
                }
                _ => println!("{} /unset N PATH", "Usage:".yellow()),
            },
            "/add" => match rest {
                "" => println!("{} /add TITLE", "Usage:".yellow()),
                title => {
                    if let Some(index) = report(self.handle.add_section(title, SectionContent::default()).await) {
                        println!("{}", format!("Added section {}.", index + 1).dimmed());
                    }
                }
            },
            "/remove" => match parse_index_and_rest(rest) {
                Some((index, _)) => {
                    if let Some(section) = report(self.handle.remove_section(index).await) {
                        println!("{}", format!("Removed {}.", section.title).dimmed());
                    }
                }
                None => println!("{} /remove N", "Usage:".yellow()),
            },
            "/rename" => match parse_index_and_rest(rest) {
                Some((index, title)) if !title.is_empty() => {
                    if report(self.handle.rename_section(index, title).await).is_some() {
                        println!("{}", "Renamed.".dimmed());
                    }
                }
                _ => println!("{} /rename N TITLE", "Usage:".yellow()),
            },
            "/title" => {
                let title = Some(rest.to_string()).filter(|t| !t.is_empty());
                if report(self.handle.set_title(title).await).is_some() {
                    println!("{}", "Title set.".dimmed());
                }
            }
            "/commit" => match self.handle.commit_edit().await {
                Ok(plan) => println!("{}", format!("Saved v{}.", plan.version).green()),
                Err(e) => {
                    print_error(&e);
                    println!("{}", "Your edits are kept locally and will sync with the next save.".dimmed());
                }
            },
            "/cancel" => {
                if report(self.handle.cancel_edit().await).is_some() {
                    println!("{}", "Edit discarded.".dimmed());
                }
            }
            "/attach" => match rest {
                "" => println!("{} /attach PATH", "Usage:".yellow()),
                path => {
                    if let Some(file) = report(self.handle.upload_file(path).await) {
                        println!("{} {} {}", "+".green(), file.filename, format!("({})", file.id).dimmed());
                    }
                }
            },
            "/detach" => match rest {
                "" => println!("{} /detach FILE_ID", "Usage:".yellow()),
                id => match report(self.handle.detach_file(id).await) {
                    Some(true) => println!("{}", "Detached.".dimmed()),
                    Some(false) => println!("{}", "That file is not attached.".dimmed()),
                    None => {}
                },
            },
            "/files" => self.print_files().await,
            "/status" => self.print_status().await,
            _ => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
            }
        }
        SlashResult::Continue
    }

    async fn edit_at(&self, index: usize, path: &str, edit: ContentEdit) {
        if report(self.handle.edit_section_at(index, ContentPath::parse(path), edit).await).is_some() {
            self.print_buffer().await;
        }
    }

    async fn print_buffer(&self) {
        if let Some(Some(buffer)) = report(self.handle.edit_buffer().await) {
            print_plan(&buffer.snapshot());
        }
    }

    fn print_plans(&self) {
        match self.plans.list_plans(&self.user.user_id) {
            Ok(plans) if plans.is_empty() => println!("{}", "No saved plans.".dimmed()),
            Ok(plans) => {
                for plan in plans {
                    println!(
                        "  {:40} {} {}",
                        plan.id.yellow(),
                        plan.display_title(),
                        format!("v{}", plan.version).dimmed()
                    );
                }
            }
            Err(e) => println!("{} {}", "!".red(), e),
        }
    }

    async fn print_files(&self) {
        let Some(files) = report(self.handle.files().await) else {
            return;
        };
        if files.pending.is_empty() && files.known.is_empty() {
            println!("{}", "No files. Use /attach PATH to upload one.".dimmed());
            return;
        }
        for file in &files.pending {
            println!("  {} {} {}", "*".green(), file.filename, format!("({})", file.id).dimmed());
        }
        for file in files.known.iter().filter(|f| !files.pending.contains(f)) {
            println!("    {} {}", file.filename, format!("({})", file.id).dimmed());
        }
    }

    async fn print_status(&self) {
        let Some(snapshot) = report(self.handle.snapshot().await) else {
            return;
        };
        println!("  {:14} {}", "session".yellow(), snapshot.binding);
        println!("  {:14} {}", "research".yellow(), snapshot.status);
        if let Some(progress) = &snapshot.progress {
            println!(
                "  {:14} {}/{} {}",
                "progress".yellow(),
                progress.current_step,
                progress.total_steps,
                progress.label
            );
        }
        if let Some(tasks) = snapshot.active_plan.as_ref().or(snapshot.proposed_plan.as_ref()) {
            for (i, task) in tasks.iter().enumerate() {
                let status = task.status.as_deref().unwrap_or("pending");
                println!("  {:14} {}. {} {}", "", i + 1, task.task, format!("[{}]", status).dimmed());
            }
        }
        if snapshot.in_flight {
            println!("  {:14} {}", "request".yellow(), "in flight");
        }
    }

    /// Print help message
    fn print_help(&self) {
        println!();
        println!("{}", "Session:".bright_cyan());
        println!("  {:14} Show this help", "/help".yellow());
        println!("  {:14} Exit the REPL", "/quit".yellow());
        println!("  {:14} Start a new plan", "/new".yellow());
        println!("  {:14} Open a saved plan", "/open ID".yellow());
        println!("  {:14} List saved plans", "/plans".yellow());
        println!("  {:14} Show research status", "/status".yellow());
        println!();
        println!("{}", "Document:".bright_cyan());
        println!("  {:14} Show the displayed plan", "/plan".yellow());
        println!("  {:14} List versions", "/versions".yellow());
        println!("  {:14} View a version (or 'current')", "/view N".yellow());
        println!("  {:14} Start editing the current version", "/edit".yellow());
        println!("  {:14} Replace section N (text or JSON)", "/set N V".yellow());
        println!("  {:14} Replace a nested value, e.g. 0.name", "/setat N P V".yellow());
        println!("  {:14} Append to the list at P ('.' is the section)", "/push N P V".yellow());
        println!("  {:14} Add key K to the mapping at P", "/addkey N P K V".yellow());
        println!("  {:14} Remove the value at P", "/unset N P".yellow());
        println!("  {:14} Add a section", "/add TITLE".yellow());
        println!("  {:14} Remove section N", "/remove N".yellow());
        println!("  {:14} Rename section N", "/rename N T".yellow());
        println!("  {:14} Set or clear the plan title", "/title [T]".yellow());
        println!("  {:14} Save edits as a new version", "/commit".yellow());
        println!("  {:14} Discard edits", "/cancel".yellow());
        println!();
        println!("{}", "Files:".bright_cyan());
        println!("  {:14} Upload and attach a file", "/attach PATH".yellow());
        println!("  {:14} Detach a pending file", "/detach ID".yellow());
        println!("  {:14} List attached files", "/files".yellow());
        println!("  {:14} Reference a file in a message", "@name".yellow());
        println!();
    }
}

/// Result of handling a slash command
enum SlashResult {
    Continue,
    Quit,
}

fn print_message(msg: &ChatMessage) {
    match msg.role {
        Role::User => println!("{} {}", ">".bright_green(), msg.content),
        Role::Assistant => {
            println!();
            println!("{}", msg.content);
            if let Some(duration) = msg.research_progress.as_ref().and_then(|p| p.duration) {
                println!("{}", format!("(researched for {}s)", duration).dimmed());
            }
            println!();
        }
    }
}

fn print_error(e: &SessionError) {
    println!("{} {}", "!".red(), e);
}

/// Print a session error and discard it
fn report<T>(result: SessionResponse<T>) -> Option<T> {
    result.map_err(|e| print_error(&e)).ok()
}

/// Split `/cmd rest of line` into the command and the trimmed rest
fn split_command(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (input, ""),
    }
}

/// Parse a 1-based section number followed by the rest of the line
fn parse_index_and_rest(rest: &str) -> Option<(usize, &str)> {
    let (number, rest) = split_command(rest);
    let index = number.parse::<usize>().ok()?.checked_sub(1)?;
    Some((index, rest))
}

/// JSON lists and objects become structured content; anything else is text
fn parse_content(value: &str) -> SectionContent {
    let trimmed = value.trim_start();
    if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
        return SectionContent::text(value);
    }
    serde_json::from_str::<SectionContent>(value).unwrap_or_else(|_| SectionContent::text(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("/open  plan-1 "), ("/open", "plan-1"));
        assert_eq!(split_command("/plans"), ("/plans", ""));
    }

    #[test]
    fn test_parse_index_is_one_based() {
        assert_eq!(parse_index_and_rest("2 New title"), Some((1, "New title")));
        assert_eq!(parse_index_and_rest("0 x"), None);
        assert_eq!(parse_index_and_rest("two x"), None);
    }

    #[test]
    fn test_parse_content() {
        assert_eq!(parse_content("plain words"), SectionContent::text("plain words"));
        assert_eq!(parse_content("[not json"), SectionContent::text("[not json"));
        assert_eq!(parse_content(r#"["a", "b"]"#).kind(), "list");
        assert_eq!(parse_content(r#"{"ceo": "Jane"}"#).kind(), "mapping");
    }
}
