//! Mention and attachment resolver
//!
//! Tracks the files bound to the next outgoing message and resolves inline
//! `@file` references while the user types. A reference token is open when
//! the most recent `@` before the caret has no whitespace between it and the
//! caret. Carets are character offsets, not byte offsets.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::domain::AttachedFile;

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([^\s@]*)$").expect("mention pattern is valid"));

/// An open `@` reference before the caret
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentionToken {
    /// Character offset of the `@`
    pub start: usize,
    /// Text typed after the `@`
    pub query: String,
}

/// Result of selecting a mention candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentionSelection {
    /// Input text with the partial token replaced by the filename
    pub input: String,
    /// Caret position (characters) after the inserted filename
    pub caret: usize,
    /// True if the file was newly added to the pending set
    pub attached: bool,
}

/// Find the open reference token before `caret`, if any
pub fn detect_mention(input: &str, caret: usize) -> Option<MentionToken> {
    let prefix: String = input.chars().take(caret).collect();
    let caps = MENTION_RE.captures(&prefix)?;
    let query = caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
    let start = prefix.chars().count() - query.chars().count() - 1;
    debug!(start, %query, "detect_mention: open token");
    Some(MentionToken { start, query })
}

/// Case-insensitive substring filter over filenames, de-duplicated by id
pub fn filter_candidates<'a>(files: impl IntoIterator<Item = &'a AttachedFile>, query: &str) -> Vec<AttachedFile> {
    let needle = query.to_lowercase();
    let mut seen = std::collections::HashSet::new();
    files
        .into_iter()
        .filter(|f| seen.insert(f.id.clone()))
        .filter(|f| f.filename.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Replace the partial token `[token.start, caret)` with `@filename `
pub fn splice_mention(input: &str, token: &MentionToken, caret: usize, filename: &str) -> (String, usize) {
    let chars: Vec<char> = input.chars().collect();
    let caret = caret.min(chars.len());
    let start = token.start.min(caret);
    let before: String = chars[..start].iter().collect();
    let after: String = chars[caret..].iter().collect();
    let inserted = format!("@{} ", filename);
    let new_caret = start + inserted.chars().count();
    (format!("{}{}{}", before, inserted, after), new_caret)
}

/// Pending-attachment set plus the live mention suggestion state
#[derive(Debug, Clone, Default)]
pub struct AttachmentResolver {
    /// Files bound to the next outgoing message
    pending: Vec<AttachedFile>,
    /// Files the service already knows for this session
    known: Vec<AttachedFile>,
    /// Open token and the caret it was detected at
    open: Option<(MentionToken, usize)>,
}

impl AttachmentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-scan the input after an edit; returns the current candidates
    pub fn update_input(&mut self, input: &str, caret: usize) -> Vec<AttachedFile> {
        self.open = detect_mention(input, caret).map(|token| (token, caret));
        self.candidates()
    }

    /// Candidates for the open token; empty when no token is open
    pub fn candidates(&self) -> Vec<AttachedFile> {
        match &self.open {
            Some((token, _)) => filter_candidates(self.pending.iter().chain(self.known.iter()), &token.query),
            None => Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_token(&self) -> Option<&MentionToken> {
        self.open.as_ref().map(|(token, _)| token)
    }

    /// Splice the chosen file into `input`, bind it, and close the suggestions
    ///
    /// Returns None when no token is open.
    pub fn select(&mut self, input: &str, file: &AttachedFile) -> Option<MentionSelection> {
        let (token, caret) = self.open.take()?;
        debug!(file_id = %file.id, filename = %file.filename, "select: called");
        let (input, caret) = splice_mention(input, &token, caret, &file.filename);
        let attached = self.attach(file.clone());
        Some(MentionSelection { input, caret, attached })
    }

    /// Close the suggestion state without selecting
    pub fn close(&mut self) {
        self.open = None;
    }

    /// Add a file to the pending set; false if it was already present
    pub fn attach(&mut self, file: AttachedFile) -> bool {
        if self.pending.iter().any(|f| f.id == file.id) {
            debug!(file_id = %file.id, "attach: already pending");
            return false;
        }
        debug!(file_id = %file.id, "attach: added");
        self.pending.push(file);
        true
    }

    /// Remove a file from the pending set; false if it was not pending
    pub fn detach(&mut self, file_id: &str) -> bool {
        let before = self.pending.len();
        self.pending.retain(|f| f.id != file_id);
        before != self.pending.len()
    }

    pub fn pending(&self) -> &[AttachedFile] {
        &self.pending
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().map(|f| f.id.clone()).collect()
    }

    pub fn known(&self) -> &[AttachedFile] {
        &self.known
    }

    /// Clear the pending set at send time; the files stay discoverable
    pub fn take_pending(&mut self) -> Vec<AttachedFile> {
        let taken = std::mem::take(&mut self.pending);
        self.merge_known(taken.iter().cloned());
        taken
    }

    /// Replace the session's known files (history load)
    pub fn set_known(&mut self, files: Vec<AttachedFile>) {
        self.known.clear();
        self.merge_known(files);
    }

    /// Add files the service reports for this session
    pub fn merge_known(&mut self, files: impl IntoIterator<Item = AttachedFile>) {
        for file in files {
            if !self.known.iter().any(|f| f.id == file.id) {
                self.known.push(file);
            }
        }
    }

    /// Files referenced as `@filename` anywhere in `text`
    pub fn mentioned_in(&self, text: &str) -> Vec<AttachedFile> {
        let mut seen = std::collections::HashSet::new();
        self.pending
            .iter()
            .chain(self.known.iter())
            .filter(|f| seen.insert(f.id.clone()))
            .filter(|f| text.contains(&format!("@{}", f.filename)))
            .cloned()
            .collect()
    }

    /// Drop everything (session rebind)
    pub fn reset(&mut self) {
        self.pending.clear();
        self.known.clear();
        self.open = None;
    }
}
