//! Dump header, records, statistics and errors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Comment, Thread};

/// First line of every dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpHeader {
    #[serde(alias = "ThreadCount")]
    pub thread_count: usize,
    #[serde(alias = "CommentCount")]
    pub comment_count: usize,
}

/// One decoded record, handed to the restore callback.
#[derive(Debug, Clone, PartialEq)]
pub enum DumpRecord {
    Thread(Thread),
    Comment(Comment),
}

impl DumpRecord {
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Thread(_) => RecordKind::Thread,
            Self::Comment(_) => RecordKind::Comment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Thread,
    Comment,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread => write!(f, "thread"),
            Self::Comment => write!(f, "comment"),
        }
    }
}

/// Statistics from an export.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportStats {
    pub threads: usize,
    pub comments: usize,
    pub bytes: u64,
}

impl ExportStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.threads + self.comments
    }
}

/// Statistics from a restore.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub threads: usize,
    pub comments: usize,
}

impl ImportStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.threads + self.comments
    }
}

/// Errors from dumping or restoring.
///
/// Every per-record failure carries the 1-based line number it happened on.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid dump header at line 1: {message}")]
    Header { message: String },

    #[error("Invalid {kind} record at line {line}: {message}")]
    InvalidRecord {
        kind: RecordKind,
        line: usize,
        message: String,
    },

    #[error("Failed to insert {kind} at line {line}: {source}")]
    Insert {
        kind: RecordKind,
        line: usize,
        #[source]
        source: crate::Error,
    },

    #[error("Dump ended at line {line}, expected {expected} records")]
    Truncated { line: usize, expected: usize },

    #[error(transparent)]
    Storage(#[from] crate::Error),
}

impl DumpError {
    /// Line the failure happened on, when it is tied to one.
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Header { .. } => Some(1),
            Self::InvalidRecord { line, .. }
            | Self::Insert { line, .. }
            | Self::Truncated { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Result type for dump operations.
pub type DumpResult<T> = std::result::Result<T, DumpError>;
