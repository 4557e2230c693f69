//! Storage layer for threads and comments.
//!
//! Every backend implements the flat [`Storage`] contract, so callers (the
//! web layer, the cleanup jobs, the dump codec) never know which one is
//! active. Two driver families exist:
//!
//! - [`relational`] - one driver for SQL engines, parameterized by dialect
//!   (SQLite always; Postgres and MySQL behind cargo features)
//! - [`kv`] - one driver for key-value stores partitioned by natural key
//!   (in-memory always; DynamoDB behind the `dynamodb` feature)
//!
//! Drivers hold no in-process locks across operations. Concurrency control
//! is whatever the backend provides for a single statement or item write.

pub mod kv;
pub mod relational;

#[cfg(test)]
pub(crate) mod conformance;

use crate::config::{DatabaseConfig, Dialect};
use crate::error::{Error, Result};
use crate::model::{Comment, Thread};

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub use kv::{KvClient, KvStorage, MemoryKvClient};
pub use relational::{RelationalStorage, SqlDialect, SqliteExecutor};

/// Which stale comments a cleanup sweep removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupKind {
    /// Unconfirmed, not deleted, created at or before the threshold.
    Unconfirmed,
    /// Soft-deleted at or before the threshold.
    Deleted,
}

impl fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfirmed => write!(f, "unconfirmed"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// The capability set every backend implements.
///
/// All calls are blocking and safe to make from many threads at once.
/// Paths are stored exactly as given; run them through
/// [`crate::model::normalize_path`] before calling in.
pub trait Storage: Send + Sync {
    /// Create tables and indexes if they do not exist. Idempotent.
    fn initialize_database(&self) -> Result<()>;

    /// Create the thread for `path`, or return the id of the existing one.
    fn create_thread(&self, path: &str) -> Result<Uuid>;

    /// # Errors
    ///
    /// `Error::ThreadNotFound` if no thread has this path.
    fn get_thread(&self, path: &str) -> Result<Thread>;

    /// Add a comment to the thread at `path`, creating the thread if needed.
    ///
    /// A reply to a reply is stored as a reply to the top-level comment.
    ///
    /// # Errors
    ///
    /// `Error::InvalidRelationship` if `reply_to` does not name a comment
    /// of the same thread.
    fn create_comment(
        &self,
        body: &str,
        author: &str,
        path: &str,
        confirmed: bool,
        reply_to: Option<Uuid>,
    ) -> Result<Uuid>;

    fn get_comment(&self, id: Uuid) -> Result<Comment>;

    /// Confirmed, non-deleted comments of a thread, oldest first.
    ///
    /// # Errors
    ///
    /// `Error::ThreadNotFound` if the thread does not exist.
    fn get_comments_by_thread(&self, path: &str) -> Result<Vec<Comment>>;

    /// Replace the body, author and confirmation flag of a comment.
    fn update_comment(&self, id: Uuid, body: &str, author: &str, confirmed: bool) -> Result<()>;

    /// Soft-delete a comment and every direct reply to it.
    fn delete_comment(&self, id: Uuid) -> Result<()>;

    /// Clear the soft-delete marker of a single comment.
    fn restore_deleted_comment(&self, id: Uuid) -> Result<()>;

    /// Permanently remove a comment and every direct reply to it.
    fn hard_delete_comment(&self, id: Uuid) -> Result<()>;

    /// Every thread, oldest first.
    fn get_all_threads(&self) -> Result<Vec<Thread>>;

    /// Every comment including unconfirmed and deleted ones, oldest first.
    fn get_all_comments(&self) -> Result<Vec<Comment>>;

    /// Permanently remove stale comments of `kind`.
    ///
    /// The threshold is `now - older_than_secs`; negative values move it
    /// into the future. Returns how many matching comments were removed.
    fn clean_up_stale_data(&self, kind: CleanupKind, older_than_secs: i64) -> Result<usize>;

    /// Insert a thread verbatim, keeping its id and timestamp.
    ///
    /// Fails if the path is already taken; the stored thread is kept.
    fn import_thread(&self, thread: &Thread) -> Result<()>;

    /// Insert a comment verbatim, keeping its id, timestamps and reply target.
    ///
    /// Fails if the id is already taken.
    fn import_comment(&self, comment: &Comment) -> Result<()>;

    /// Name of the active backend variant, e.g. `sqlite3` or `dynamodb`.
    fn dialect(&self) -> &'static str;
}

/// Resolve the stored reply target for a new comment in `thread_id`.
///
/// `parent` is the lookup result for the requested target. Replies to
/// replies are flattened onto the parent's own target.
pub(crate) fn resolve_reply_target(
    thread_id: Uuid,
    reply_to: Uuid,
    parent: Result<Comment>,
) -> Result<Uuid> {
    let parent = match parent {
        Ok(parent) => parent,
        Err(Error::CommentNotFound { .. }) => return Err(Error::InvalidRelationship { reply_to }),
        Err(e) => return Err(e),
    };
    if parent.thread_id != thread_id {
        return Err(Error::InvalidRelationship { reply_to });
    }
    Ok(parent.reply_to.unwrap_or(parent.id))
}

/// Earliest threshold a sweep uses, 0001-01-01T00:00:00Z.
const EARLIEST_THRESHOLD_SECS: i64 = -62_135_596_800;
/// Latest threshold a sweep uses, 9999-12-31T23:59:59Z.
const LATEST_THRESHOLD_SECS: i64 = 253_402_300_799;

/// Threshold timestamp for a sweep removing data older than `older_than_secs`.
///
/// Saturates to years 1 and 9999, which every backend can store and compare,
/// so huge positive values match nothing and huge negative ones match all.
pub(crate) fn cleanup_threshold(older_than_secs: i64) -> DateTime<Utc> {
    let now = crate::model::now();
    let earliest =
        DateTime::from_timestamp(EARLIEST_THRESHOLD_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let latest =
        DateTime::from_timestamp(LATEST_THRESHOLD_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC);

    chrono::Duration::try_seconds(older_than_secs)
        .and_then(|age| now.checked_sub_signed(age))
        .map_or(
            if older_than_secs > 0 { earliest } else { latest },
            |at| at.clamp(earliest, latest),
        )
}

/// Hard-delete every comment in `ids`, skipping those already removed
/// as replies of an earlier one.
pub(crate) fn hard_delete_all<S: Storage + ?Sized>(storage: &S, ids: &[Uuid]) -> Result<()> {
    for id in ids {
        match storage.hard_delete_comment(*id) {
            Ok(()) | Err(Error::CommentNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Build the driver selected by `config` and initialize its schema.
///
/// # Errors
///
/// Returns `Error::Config` for an invalid config or a dialect this build
/// was compiled without, and any backend error from connecting or
/// creating the schema.
pub fn open_storage(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    config.validate()?;
    let dialect = config.dialect()?;

    let storage: Arc<dyn Storage> = match dialect {
        Dialect::Sqlite3 => Arc::new(relational::open_sqlite(config)?),
        #[cfg(feature = "postgres")]
        Dialect::Postgres => Arc::new(relational::open_postgres(config)?),
        #[cfg(feature = "mysql")]
        Dialect::Mysql => Arc::new(relational::open_mysql(config)?),
        #[cfg(feature = "dynamodb")]
        Dialect::DynamoDb => Arc::new(kv::open_dynamodb(config)?),
        #[allow(unreachable_patterns)]
        other => {
            return Err(Error::Config(format!(
                "dialect {other} is not enabled in this build (missing cargo feature)"
            )));
        }
    };

    tracing::info!(dialect = %dialect, "Initializing database");
    storage.initialize_database()?;
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_threshold_saturates() {
        let earliest = DateTime::from_timestamp(EARLIEST_THRESHOLD_SECS, 0).unwrap();
        let latest = DateTime::from_timestamp(LATEST_THRESHOLD_SECS, 0).unwrap();

        assert_eq!(cleanup_threshold(i64::MAX), earliest);
        assert_eq!(cleanup_threshold(10_000_000_000_000), earliest);
        assert_eq!(cleanup_threshold(i64::MIN), latest);
        assert_eq!(cleanup_threshold(-10_000_000_000_000), latest);

        let hour_ago = cleanup_threshold(3600);
        let expected = crate::model::now() - chrono::Duration::hours(1);
        assert!((expected - hour_ago).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_open_storage_sqlite_memory() {
        let storage = open_storage(&DatabaseConfig::sqlite(crate::config::SQLITE_MEMORY)).unwrap();
        assert_eq!(storage.dialect(), "sqlite3");

        let id = storage.create_thread("/opened/").unwrap();
        assert_eq!(storage.get_thread("/opened/").unwrap().id, id);
    }

    #[test]
    fn test_open_storage_rejects_unknown_dialect() {
        let config = DatabaseConfig {
            dialect: "oracle".to_string(),
            ..DatabaseConfig::default()
        };
        let err = open_storage(&config).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn test_open_storage_without_feature() {
        let config = DatabaseConfig {
            dialect: "postgres".to_string(),
            database: Some("comments".to_string()),
            username: Some("postgres".to_string()),
            password: Some(String::new()),
            host: Some("localhost".to_string()),
            ..DatabaseConfig::default()
        };
        let err = open_storage(&config).err().unwrap();
        assert!(err.to_string().contains("not enabled"));
    }

    #[test]
    fn test_resolve_reply_target_flattens() {
        let thread = Thread::new("/t/".to_string());
        let top = Comment::new(thread.id, "top", "a", true, None);
        let reply = Comment::new(thread.id, "reply", "b", true, Some(top.id));

        assert_eq!(
            resolve_reply_target(thread.id, top.id, Ok(top.clone())).unwrap(),
            top.id
        );
        assert_eq!(
            resolve_reply_target(thread.id, reply.id, Ok(reply)).unwrap(),
            top.id
        );
    }

    #[test]
    fn test_resolve_reply_target_rejects_other_thread_and_missing() {
        let other = Comment::new(Uuid::new_v4(), "elsewhere", "a", true, None);
        let err = resolve_reply_target(Uuid::new_v4(), other.id, Ok(other.clone())).unwrap_err();
        assert!(matches!(err, Error::InvalidRelationship { reply_to } if reply_to == other.id));

        let missing = Uuid::new_v4();
        let err = resolve_reply_target(
            Uuid::new_v4(),
            missing,
            Err(Error::CommentNotFound { id: missing }),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidRelationship { .. }));
    }

    #[test]
    fn test_cleanup_kind_display() {
        assert_eq!(CleanupKind::Unconfirmed.to_string(), "unconfirmed");
        assert_eq!(CleanupKind::Deleted.to_string(), "deleted");
    }
}
