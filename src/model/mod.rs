//! Data models for the comment engine.
//!
//! This module contains the two domain entities and the small pure helpers
//! every backend shares:
//! - [`Thread`] - a conversation bound to a unique path
//! - [`Comment`] - a message on a thread, optionally replying to another one
//! - identifier generation, timestamps, path normalization and ordering

pub mod comment;
pub mod thread;

pub use comment::Comment;
pub use thread::Thread;

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

/// Generate a fresh opaque identifier.
///
/// Stateless and callable from any thread.
#[must_use]
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// Current UTC time truncated to microseconds.
///
/// Every backend stores at most microsecond precision, so values produced
/// here survive a write/read cycle unchanged.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Normalize a thread path so equivalent paths compare equal.
///
/// A leading slash is always added. A trailing slash is added only when the
/// path contains no `.` at all, so `/v1.2/changes` is left alone. Existing
/// trailing slashes are kept; paths stored by earlier deployments follow the
/// same rule.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(path);
    if !normalized.contains('.') && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Sort threads by creation time, oldest first.
pub fn sort_threads(threads: &mut [Thread]) {
    threads.sort_by_key(|t| t.created_at);
}

/// Sort comments by creation time, oldest first.
pub fn sort_comments(comments: &mut [Comment]) {
    comments.sort_by_key(|c| c.created_at);
}
