//! SQLite executor.
//!
//! File databases get a small pool of connections in WAL mode so readers
//! never block on a writer; writers wait on the busy timeout. In-memory
//! databases are private to one connection, so that connection is shared
//! behind a mutex.

use super::{SqlExecutor, SqlValue};
use crate::error::Result;
use crate::model::{Comment, Thread};

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSqlError, ToSqlOutput, Type, Value};
use rusqlite::{Connection, Row, ToSql, TransactionBehavior, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Idle connections kept open for reuse.
const MAX_IDLE_CONNECTIONS: usize = 8;

/// Executor backed by rusqlite.
#[derive(Debug)]
pub struct SqliteExecutor {
    target: Target,
}

#[derive(Debug)]
enum Target {
    File {
        path: PathBuf,
        timeout: Duration,
        idle: Mutex<Vec<Connection>>,
    },
    Memory(Mutex<Connection>),
}

impl SqliteExecutor {
    /// Open a database at the given path.
    ///
    /// Creates the file if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        // Default 5 second timeout
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(5_000));

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Connect once up front so a bad path fails here, not on first use.
        let conn = connect(path, timeout)?;
        Ok(Self {
            target: Target::File {
                path: path.to_path_buf(),
                timeout,
                idle: Mutex::new(vec![conn]),
            },
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            target: Target::Memory(Mutex::new(conn)),
        })
    }

    /// Run `f` with a connection checked out for the duration of the call.
    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        match &self.target {
            Target::Memory(conn) => f(&mut lock(conn)),
            Target::File {
                path,
                timeout,
                idle,
            } => {
                let pooled = lock(idle).pop();
                let mut conn = match pooled {
                    Some(conn) => conn,
                    None => connect(path, *timeout)?,
                };
                let result = f(&mut conn);

                let mut idle = lock(idle);
                if idle.len() < MAX_IDLE_CONNECTIONS {
                    idle.push(conn);
                }
                result
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn connect(path: &Path, timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(timeout)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

impl SqlExecutor for SqliteExecutor {
    fn execute_batch(&self, statements: &[String]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            for statement in statements {
                tx.execute_batch(statement)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let affected = stmt.execute(params_from_iter(params))?;
            Ok(affected as u64)
        })
    }

    fn query_threads(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Thread>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let threads = stmt
                .query_map(params_from_iter(params), map_thread)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(threads)
        })
    }

    fn query_comments(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Comment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let comments = stmt
                .query_map(params_from_iter(params), map_comment)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(comments)
        })
    }
}

// Ids are 16-byte blobs, timestamps Unix microseconds.
impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Self::Id(id) | Self::OptId(Some(id)) => Value::Blob(id.as_bytes().to_vec()),
            Self::Text(text) => Value::Text(text.clone()),
            Self::Bool(flag) => Value::Integer(i64::from(*flag)),
            Self::Time(ts) | Self::OptTime(Some(ts)) => Value::Integer(ts.timestamp_micros()),
            Self::OptId(None) | Self::OptTime(None) => Value::Null,
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

fn map_thread(row: &Row) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: id_at(row, 0)?,
        path: row.get(1)?,
        created_at: time_at(row, 2)?,
    })
}

fn map_comment(row: &Row) -> rusqlite::Result<Comment> {
    let deleted_at: Option<i64> = row.get(6)?;
    let reply_to: Option<Vec<u8>> = row.get(7)?;
    Ok(Comment {
        id: id_at(row, 0)?,
        thread_id: id_at(row, 1)?,
        body: row.get(2)?,
        author: row.get(3)?,
        confirmed: row.get(4)?,
        created_at: time_at(row, 5)?,
        deleted_at: deleted_at.map(|micros| micros_to_time(6, micros)).transpose()?,
        reply_to: reply_to.map(|bytes| bytes_to_id(7, &bytes)).transpose()?,
    })
}

fn id_at(row: &Row, idx: usize) -> rusqlite::Result<uuid::Uuid> {
    let bytes: Vec<u8> = row.get(idx)?;
    bytes_to_id(idx, &bytes)
}

fn bytes_to_id(idx: usize, bytes: &[u8]) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::from_slice(bytes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e)))
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    micros_to_time(idx, micros)
}

fn micros_to_time(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            Box::new(FromSqlError::OutOfRange(micros)),
        )
    })
}
