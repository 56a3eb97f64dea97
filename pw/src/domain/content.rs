//! Section content: a recursive tagged union with path-addressed edits
//!
//! Research findings come back in whatever shape suits them: prose, a list of
//! bullet points or records, or a nested key/value breakdown. Content is
//! (de)serialized through `serde_json::Value` so the wire form stays the plain
//! JSON the service produces. Numbers, bools and null survive unchanged.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Key/value content; insertion order is preserved for display
pub type Mapping = IndexMap<String, SectionContent>;

/// Errors from structural content edits
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("No content at path '{0}'")]
    InvalidPath(String),

    #[error("Cannot place {found} content where a {expected} is required")]
    ShapeMismatch { expected: &'static str, found: &'static str },

    #[error("Key already exists: {0}")]
    DuplicateKey(String),
}

/// A structural change to one node of section content
#[derive(Debug, Clone, PartialEq)]
pub enum ContentEdit {
    Replace(SectionContent),
    /// Append to the list at the path
    Push(SectionContent),
    /// Add a new key to the mapping or record at the path
    InsertKey { key: String, value: SectionContent },
    Remove,
}

/// Content of a plan section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum SectionContent {
    Text(String),
    /// Number, bool or null, kept as the service sent it
    Scalar(Value),
    List(Vec<ListEntry>),
    Mapping(Mapping),
}

/// An entry of a list section: a bullet string or a structured record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ListEntry {
    Text(String),
    Scalar(Value),
    Record(Mapping),
}

impl Default for SectionContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl SectionContent {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Scalar(_) => "scalar",
            Self::List(_) => "list",
            Self::Mapping(_) => "mapping",
        }
    }

    /// True when the content carries nothing worth rendering
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Scalar(v) => v.is_null(),
            Self::List(items) => items.is_empty(),
            Self::Mapping(map) => map.is_empty(),
        }
    }

    /// Apply one structural edit at `path`
    pub fn apply(&mut self, path: &ContentPath, edit: ContentEdit) -> Result<(), ContentError> {
        match edit {
            ContentEdit::Replace(value) => self.replace_at(path, value),
            ContentEdit::Push(value) => self.push_at(path, value),
            ContentEdit::InsertKey { key, value } => self.insert_key_at(path, &key, value),
            ContentEdit::Remove => self.remove_at(path),
        }
    }

    /// Replace the node at `path`; an empty path replaces the whole content
    pub fn replace_at(&mut self, path: &ContentPath, value: SectionContent) -> Result<(), ContentError> {
        debug!(%path, kind = value.kind(), "replace_at: called");
        match node_mut(self, path.segments())? {
            NodeMut::Content(slot) => *slot = value,
            NodeMut::Entry(slot) => *slot = ListEntry::try_from(value)?,
        }
        Ok(())
    }

    /// Append an entry to the list at `path`
    pub fn push_at(&mut self, path: &ContentPath, value: SectionContent) -> Result<(), ContentError> {
        debug!(%path, kind = value.kind(), "push_at: called");
        match node_mut(self, path.segments())? {
            NodeMut::Content(SectionContent::List(items)) => {
                items.push(ListEntry::try_from(value)?);
                Ok(())
            }
            NodeMut::Content(other) => Err(ContentError::ShapeMismatch {
                expected: "list",
                found: other.kind(),
            }),
            NodeMut::Entry(entry) => Err(ContentError::ShapeMismatch {
                expected: "list",
                found: entry.kind(),
            }),
        }
    }

    /// Insert a new key into the mapping (or record) at `path`
    pub fn insert_key_at(&mut self, path: &ContentPath, key: &str, value: SectionContent) -> Result<(), ContentError> {
        debug!(%path, %key, "insert_key_at: called");
        let map = match node_mut(self, path.segments())? {
            NodeMut::Content(SectionContent::Mapping(map)) => map,
            NodeMut::Entry(ListEntry::Record(map)) => map,
            NodeMut::Content(other) => {
                return Err(ContentError::ShapeMismatch {
                    expected: "mapping",
                    found: other.kind(),
                });
            }
            NodeMut::Entry(entry) => {
                return Err(ContentError::ShapeMismatch {
                    expected: "mapping",
                    found: entry.kind(),
                });
            }
        };
        if map.contains_key(key) {
            return Err(ContentError::DuplicateKey(key.to_string()));
        }
        map.insert(key.to_string(), value);
        Ok(())
    }

    /// Remove the node at `path` from its parent list or mapping
    pub fn remove_at(&mut self, path: &ContentPath) -> Result<(), ContentError> {
        debug!(%path, "remove_at: called");
        let Some((last, parent)) = path.segments().split_last() else {
            return Err(ContentError::InvalidPath(path.to_string()));
        };
        let missing = || ContentError::InvalidPath(path.to_string());
        match (node_mut(self, parent)?, last) {
            (NodeMut::Content(SectionContent::List(items)), PathSegment::Index(i)) => {
                if *i >= items.len() {
                    return Err(missing());
                }
                items.remove(*i);
            }
            (NodeMut::Content(SectionContent::Mapping(map)), seg) | (NodeMut::Entry(ListEntry::Record(map)), seg) => {
                map.shift_remove(&seg.as_key()).ok_or_else(missing)?;
            }
            _ => return Err(missing()),
        }
        Ok(())
    }

    /// Render as indented plain text for terminal display
    pub fn render(&self) -> String {
        let mut out = String::new();
        render_content(self, 0, &mut out);
        out
    }
}

impl ListEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Scalar(_) => "scalar",
            Self::Record(_) => "record",
        }
    }
}

impl TryFrom<SectionContent> for ListEntry {
    type Error = ContentError;

    fn try_from(value: SectionContent) -> Result<Self, Self::Error> {
        match value {
            SectionContent::Text(s) => Ok(Self::Text(s)),
            SectionContent::Scalar(v) => Ok(Self::Scalar(v)),
            SectionContent::Mapping(map) => Ok(Self::Record(map)),
            SectionContent::List(_) => Err(ContentError::ShapeMismatch {
                expected: "text or record",
                found: "list",
            }),
        }
    }
}

impl From<ListEntry> for SectionContent {
    fn from(entry: ListEntry) -> Self {
        match entry {
            ListEntry::Text(s) => Self::Text(s),
            ListEntry::Scalar(v) => Self::Scalar(v),
            ListEntry::Record(map) => Self::Mapping(map),
        }
    }
}

/// Display form of a non-string scalar; null shows as nothing
fn scalar_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn mapping_from(object: serde_json::Map<String, Value>) -> Mapping {
    object.into_iter().map(|(k, v)| (k, SectionContent::from(v))).collect()
}

fn mapping_into(map: Mapping) -> Value {
    Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
}

impl From<Value> for SectionContent {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::List(items.into_iter().map(ListEntry::from).collect()),
            Value::Object(object) => Self::Mapping(mapping_from(object)),
            Value::String(s) => Self::Text(s),
            other => Self::Scalar(other),
        }
    }
}

impl From<SectionContent> for Value {
    fn from(content: SectionContent) -> Self {
        match content {
            SectionContent::Text(s) => Value::String(s),
            SectionContent::Scalar(v) => v,
            SectionContent::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            SectionContent::Mapping(map) => mapping_into(map),
        }
    }
}

impl From<Value> for ListEntry {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(object) => Self::Record(mapping_from(object)),
            Value::String(s) => Self::Text(s),
            // Nested arrays have no list-entry shape; keep them readable as text
            Value::Array(items) => Self::Text(Value::Array(items).to_string()),
            other => Self::Scalar(other),
        }
    }
}

impl From<ListEntry> for Value {
    fn from(entry: ListEntry) -> Self {
        match entry {
            ListEntry::Text(s) => Value::String(s),
            ListEntry::Scalar(v) => v,
            ListEntry::Record(map) => mapping_into(map),
        }
    }
}

/// One step of a content path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl PathSegment {
    /// Mapping key for this segment (numeric keys are valid mapping keys)
    fn as_key(&self) -> String {
        match self {
            Self::Index(i) => i.to_string(),
            Self::Key(k) => k.clone(),
        }
    }
}

/// Address of a node inside section content, e.g. `2.revenue.0`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentPath(Vec<PathSegment>);

impl ContentPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Parse a dotted path; all-digit segments become indexes
    pub fn parse(s: &str) -> Self {
        let segments = s
            .split('.')
            .filter(|seg| !seg.is_empty())
            .map(|seg| match seg.parse::<usize>() {
                Ok(i) => PathSegment::Index(i),
                Err(_) => PathSegment::Key(seg.to_string()),
            })
            .collect();
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ContentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(PathSegment::as_key).collect();
        write!(f, "{}", parts.join("."))
    }
}

enum NodeMut<'a> {
    Content(&'a mut SectionContent),
    Entry(&'a mut ListEntry),
}

fn node_mut<'a>(root: &'a mut SectionContent, path: &[PathSegment]) -> Result<NodeMut<'a>, ContentError> {
    let mut node = NodeMut::Content(root);
    for (depth, seg) in path.iter().enumerate() {
        let missing = || {
            ContentError::InvalidPath(ContentPath(path[..=depth].to_vec()).to_string())
        };
        node = match (node, seg) {
            (NodeMut::Content(SectionContent::List(items)), PathSegment::Index(i)) => {
                NodeMut::Entry(items.get_mut(*i).ok_or_else(missing)?)
            }
            (NodeMut::Content(SectionContent::Mapping(map)), seg) | (NodeMut::Entry(ListEntry::Record(map)), seg) => {
                NodeMut::Content(map.get_mut(&seg.as_key()).ok_or_else(missing)?)
            }
            _ => return Err(missing()),
        };
    }
    Ok(node)
}

fn render_content(content: &SectionContent, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match content {
        SectionContent::Text(s) => {
            for line in s.lines() {
                out.push_str(&format!("{}{}\n", pad, line));
            }
        }
        SectionContent::Scalar(v) => out.push_str(&format!("{}{}\n", pad, scalar_display(v))),
        SectionContent::List(items) => {
            for item in items {
                match item {
                    ListEntry::Text(s) => out.push_str(&format!("{}- {}\n", pad, s)),
                    ListEntry::Scalar(v) => out.push_str(&format!("{}- {}\n", pad, scalar_display(v))),
                    ListEntry::Record(map) => {
                        out.push_str(&format!("{}-\n", pad));
                        render_mapping(map, indent + 1, out);
                    }
                }
            }
        }
        SectionContent::Mapping(map) => render_mapping(map, indent, out),
    }
}

fn render_mapping(map: &Mapping, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    for (key, value) in map {
        match value {
            SectionContent::Text(s) if !s.contains('\n') => out.push_str(&format!("{}{}: {}\n", pad, key, s)),
            SectionContent::Scalar(v) => out.push_str(&format!("{}{}: {}\n", pad, key, scalar_display(v))),
            other => {
                out.push_str(&format!("{}{}:\n", pad, key));
                render_content(other, indent + 1, out);
            }
        }
    }
}
