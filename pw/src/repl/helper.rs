//! Line-editor helper: slash-command and `@file` completion

use std::sync::{Arc, Mutex};

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use tracing::debug;

use crate::domain::AttachedFile;
use crate::mention::{detect_mention, filter_candidates};

pub(crate) const COMMANDS: &[&str] = &[
    "/help", "/quit", "/new", "/open", "/plans", "/plan", "/versions", "/view", "/edit", "/set", "/setat", "/push",
    "/add", "/addkey", "/unset", "/remove", "/rename", "/title", "/commit", "/cancel", "/attach", "/detach", "/files",
    "/status",
];

/// Completion source for the REPL prompt
///
/// `files` is refreshed from the session before each prompt so completion
/// never has to reach into the actor.
#[derive(Clone, Default)]
pub struct ReplHelper {
    files: Arc<Mutex<Vec<AttachedFile>>>,
}

impl ReplHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the files offered for `@` completion
    pub fn set_files(&self, files: Vec<AttachedFile>) {
        if let Ok(mut guard) = self.files.lock() {
            *guard = files;
        }
    }

    fn complete_mention(&self, line: &str, pos: usize) -> Option<(usize, Vec<Pair>)> {
        let caret = line[..pos].chars().count();
        let token = detect_mention(line, caret)?;
        let start = line.char_indices().nth(token.start).map(|(b, _)| b)?;
        let files = self.files.lock().ok()?;
        let candidates = filter_candidates(files.iter(), &token.query)
            .into_iter()
            .map(|f| Pair {
                display: f.filename.clone(),
                replacement: format!("@{} ", f.filename),
            })
            .collect();
        debug!(start, query = %token.query, "complete_mention: called");
        Some((start, candidates))
    }
}

impl Helper for ReplHelper {}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        let prefix = &line[..pos];
        if prefix.starts_with('/') && !prefix.contains(' ') {
            let candidates = COMMANDS
                .iter()
                .filter(|cmd| cmd.starts_with(prefix))
                .map(|cmd| Pair {
                    display: cmd.to_string(),
                    replacement: format!("{} ", cmd),
                })
                .collect();
            return Ok((0, candidates));
        }
        Ok(self.complete_mention(line, pos).unwrap_or((pos, Vec::new())))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let prefix = &line[..pos];
        if !prefix.starts_with('/') || prefix.contains(' ') {
            return None;
        }
        COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(prefix) && cmd.len() > prefix.len())
            .map(|cmd| cmd[prefix.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {}

impl Validator for ReplHelper {}

#[cfg(test)]
mod tests {
    use super::*;

    fn helper() -> ReplHelper {
        let helper = ReplHelper::new();
        helper.set_files(vec![
            AttachedFile::new("f1", "Q3-report.pdf"),
            AttachedFile::new("f2", "notes.txt"),
        ]);
        helper
    }

    #[test]
    fn test_mention_completion_replaces_from_at() {
        let (start, pairs) = helper().complete_mention("compare @rep", 12).unwrap();
        assert_eq!(start, 8);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].replacement, "@Q3-report.pdf ");
    }

    #[test]
    fn test_mention_completion_byte_offsets() {
        let line = "résumé @no";
        let (start, pairs) = helper().complete_mention(line, line.len()).unwrap();
        assert_eq!(&line[start..], "@no");
        assert_eq!(pairs[0].display, "notes.txt");
    }

    #[test]
    fn test_no_mention_without_at() {
        assert!(helper().complete_mention("plain text", 10).is_none());
    }
}
