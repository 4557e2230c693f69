//! Comment model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message attached to a thread.
///
/// Replies are at most one level deep: `reply_to`, when set, always names
/// a top-level comment of the same thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Comment {
    pub id: Uuid,

    /// Owning thread
    pub thread_id: Uuid,

    /// Already-sanitized HTML or text
    pub body: String,

    pub author: String,

    /// Moderation gate; unconfirmed comments are hidden from public reads
    pub confirmed: bool,

    pub created_at: DateTime<Utc>,

    /// Soft-delete marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
}

impl Comment {
    /// Create a new comment with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(
        thread_id: Uuid,
        body: &str,
        author: &str,
        confirmed: bool,
        reply_to: Option<Uuid>,
    ) -> Self {
        Self {
            id: super::new_id(),
            thread_id,
            body: body.to_string(),
            author: author.to_string(),
            confirmed,
            created_at: super::now(),
            deleted_at: None,
            reply_to,
        }
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the comment shows up in public listings.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.confirmed && !self.is_deleted()
    }
}
