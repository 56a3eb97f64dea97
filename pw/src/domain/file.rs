//! Files bound to outgoing messages

use serde::{Deserialize, Serialize};

/// A file uploaded to the service, referenced by id in chat requests
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachedFile {
    pub id: String,
    #[serde(alias = "name")]
    pub filename: String,
}

impl AttachedFile {
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_name_alias() {
        let file: AttachedFile = serde_json::from_str(r#"{"id": "file-1", "name": "q3.pdf"}"#).unwrap();
        assert_eq!(file, AttachedFile::new("file-1", "q3.pdf"));
        let json = serde_json::to_string(&file).unwrap();
        assert_eq!(json, r#"{"id":"file-1","filename":"q3.pdf"}"#);
    }
}
