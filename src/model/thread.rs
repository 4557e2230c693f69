//! Thread model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation bound to a unique path (usually a page URL).
///
/// Threads are created on the first comment to a new path, or explicitly,
/// and are never deleted by normal operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Thread {
    pub id: Uuid,

    /// Globally unique path
    pub path: String,

    pub created_at: DateTime<Utc>,
}

impl Thread {
    /// Create a new thread for `path` with a fresh id.
    #[must_use]
    pub fn new(path: String) -> Self {
        Self {
            id: super::new_id(),
            path,
            created_at: super::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let thread = Thread::new("/test/".to_string());
        let json = serde_json::to_value(&thread).unwrap();
        assert_eq!(json["Path"], "/test/");
        assert_eq!(json["Id"], thread.id.to_string());
        assert!(json.get("CreatedAt").is_some());
    }
}
