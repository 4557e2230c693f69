//! Relational driver.
//!
//! One [`Storage`] implementation for every SQL engine. What differs between
//! engines is split in two:
//! - [`SqlDialect`] - placeholder style and upsert spelling, plus the
//!   per-dialect DDL in [`schema`]
//! - [`SqlExecutor`] - how a statement reaches the engine and how rows are
//!   decoded into [`Thread`] / [`Comment`]
//!
//! Each operation is one statement, or a short sequence of independent
//! statements, relying on the engine's row-level atomicity. Multi-row reads
//! are re-sorted in process so ordering never depends on the engine.

mod dialect;
pub mod schema;
mod sqlite;

#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;

pub use dialect::{
    COMMENT_COLUMNS, Placeholder, SqlDialect, Statements, THREAD_COLUMNS, TableNames,
};
pub use sqlite::SqliteExecutor;

#[cfg(feature = "mysql")]
pub use mysql::MysqlExecutor;
#[cfg(feature = "postgres")]
pub use postgres::PostgresExecutor;

use crate::config::{DatabaseConfig, SQLITE_MEMORY};
use crate::error::{Error, Result};
use crate::model::{self, Comment, Thread};
use crate::storage::{
    CleanupKind, Storage, cleanup_threshold, hard_delete_all, resolve_reply_target,
};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

/// A bind parameter.
///
/// Executors map each variant onto the engine's native type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Id(Uuid),
    OptId(Option<Uuid>),
    Text(String),
    Bool(bool),
    Time(DateTime<Utc>),
    OptTime(Option<DateTime<Utc>>),
}

/// Runs statements against one SQL engine.
///
/// Row decoding follows [`THREAD_COLUMNS`] and [`COMMENT_COLUMNS`].
pub trait SqlExecutor: Send + Sync {
    /// Run DDL statements in order.
    fn execute_batch(&self, statements: &[String]) -> Result<()>;

    /// Run one statement, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    fn query_threads(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Thread>>;

    fn query_comments(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Comment>>;
}

/// The relational [`Storage`] driver.
pub struct RelationalStorage<E> {
    executor: E,
    dialect: SqlDialect,
    tables: TableNames,
    sql: Statements,
}

impl<E: SqlExecutor> RelationalStorage<E> {
    /// Wrap an executor. The schema is created by
    /// [`Storage::initialize_database`].
    pub fn new(executor: E, dialect: SqlDialect, table_prefix: &str) -> Self {
        let tables = TableNames::with_prefix(table_prefix);
        let sql = Statements::new(dialect, &tables);
        Self {
            executor,
            dialect,
            tables,
            sql,
        }
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    #[must_use]
    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    fn insert_comment(&self, comment: &Comment) -> Result<()> {
        self.executor.execute(
            &self.sql.insert_comment,
            &[
                SqlValue::Id(comment.id),
                SqlValue::Id(comment.thread_id),
                SqlValue::Text(comment.body.clone()),
                SqlValue::Text(comment.author.clone()),
                SqlValue::Bool(comment.confirmed),
                SqlValue::Time(comment.created_at),
                SqlValue::OptTime(comment.deleted_at),
                SqlValue::OptId(comment.reply_to),
            ],
        )?;
        Ok(())
    }

    // MySQL reports changed rows rather than matched rows, so zero affected
    // rows only means "missing" once a lookup agrees.
    fn ensure_affected(&self, affected: u64, id: Uuid) -> Result<()> {
        if affected == 0 {
            self.get_comment(id)?;
        }
        Ok(())
    }
}

impl<E: SqlExecutor> Storage for RelationalStorage<E> {
    fn initialize_database(&self) -> Result<()> {
        self.executor
            .execute_batch(&schema::schema_statements(self.dialect, &self.tables))?;
        let recorded = self.executor.execute(
            &self.sql.record_migration,
            &[
                SqlValue::Text(schema::CURRENT_SCHEMA_VERSION.to_string()),
                SqlValue::Time(model::now()),
            ],
        )?;
        if recorded > 0 {
            info!(
                dialect = self.dialect.name(),
                version = schema::CURRENT_SCHEMA_VERSION,
                "Schema created"
            );
        }
        Ok(())
    }

    fn create_thread(&self, path: &str) -> Result<Uuid> {
        let thread = Thread::new(path.to_string());
        let inserted = self.executor.execute(
            &self.sql.insert_thread_if_absent,
            &[
                SqlValue::Id(thread.id),
                SqlValue::Text(thread.path),
                SqlValue::Time(thread.created_at),
            ],
        )?;
        if inserted > 0 {
            debug!(path, id = %thread.id, "Created thread");
            return Ok(thread.id);
        }
        Ok(self.get_thread(path)?.id)
    }

    fn get_thread(&self, path: &str) -> Result<Thread> {
        self.executor
            .query_threads(
                &self.sql.select_thread_by_path,
                &[SqlValue::Text(path.to_string())],
            )?
            .into_iter()
            .next()
            .ok_or_else(|| Error::ThreadNotFound {
                path: path.to_string(),
            })
    }

    fn create_comment(
        &self,
        body: &str,
        author: &str,
        path: &str,
        confirmed: bool,
        reply_to: Option<Uuid>,
    ) -> Result<Uuid> {
        let thread_id = match self.get_thread(path) {
            Ok(thread) => thread.id,
            Err(Error::ThreadNotFound { .. }) => self.create_thread(path)?,
            Err(e) => return Err(e),
        };

        let reply_to = reply_to
            .map(|target| resolve_reply_target(thread_id, target, self.get_comment(target)))
            .transpose()?;

        let comment = Comment::new(thread_id, body, author, confirmed, reply_to);
        self.insert_comment(&comment)?;
        Ok(comment.id)
    }

    fn get_comment(&self, id: Uuid) -> Result<Comment> {
        self.executor
            .query_comments(&self.sql.select_comment, &[SqlValue::Id(id)])?
            .into_iter()
            .next()
            .ok_or(Error::CommentNotFound { id })
    }

    fn get_comments_by_thread(&self, path: &str) -> Result<Vec<Comment>> {
        let thread = self.get_thread(path)?;
        let mut comments = self.executor.query_comments(
            &self.sql.select_visible_comments,
            &[SqlValue::Id(thread.id), SqlValue::Bool(true)],
        )?;
        model::sort_comments(&mut comments);
        Ok(comments)
    }

    fn update_comment(&self, id: Uuid, body: &str, author: &str, confirmed: bool) -> Result<()> {
        let affected = self.executor.execute(
            &self.sql.update_comment,
            &[
                SqlValue::Text(body.to_string()),
                SqlValue::Text(author.to_string()),
                SqlValue::Bool(confirmed),
                SqlValue::Id(id),
            ],
        )?;
        self.ensure_affected(affected, id)
    }

    fn delete_comment(&self, id: Uuid) -> Result<()> {
        let affected = self.executor.execute(
            &self.sql.soft_delete_comment,
            &[
                SqlValue::Time(model::now()),
                SqlValue::Id(id),
                SqlValue::Id(id),
            ],
        )?;
        self.ensure_affected(affected, id)
    }

    fn restore_deleted_comment(&self, id: Uuid) -> Result<()> {
        let affected = self
            .executor
            .execute(&self.sql.restore_comment, &[SqlValue::Id(id)])?;
        self.ensure_affected(affected, id)
    }

    fn hard_delete_comment(&self, id: Uuid) -> Result<()> {
        let affected = self.executor.execute(
            &self.sql.hard_delete_comment,
            &[SqlValue::Id(id), SqlValue::Id(id)],
        )?;
        if affected == 0 {
            return Err(Error::CommentNotFound { id });
        }
        debug!(%id, affected, "Hard-deleted comment");
        Ok(())
    }

    fn get_all_threads(&self) -> Result<Vec<Thread>> {
        let mut threads = self.executor.query_threads(&self.sql.select_threads, &[])?;
        model::sort_threads(&mut threads);
        Ok(threads)
    }

    fn get_all_comments(&self) -> Result<Vec<Comment>> {
        let mut comments = self
            .executor
            .query_comments(&self.sql.select_comments, &[])?;
        model::sort_comments(&mut comments);
        Ok(comments)
    }

    fn clean_up_stale_data(&self, kind: CleanupKind, older_than_secs: i64) -> Result<usize> {
        let threshold = cleanup_threshold(older_than_secs);
        let stale = match kind {
            CleanupKind::Unconfirmed => self.executor.query_comments(
                &self.sql.select_stale_unconfirmed,
                &[SqlValue::Bool(false), SqlValue::Time(threshold)],
            )?,
            CleanupKind::Deleted => self.executor.query_comments(
                &self.sql.select_stale_deleted,
                &[SqlValue::Time(threshold)],
            )?,
        };

        let ids: Vec<Uuid> = stale.iter().map(|c| c.id).collect();
        hard_delete_all(self, &ids)?;
        debug!(%kind, removed = ids.len(), "Cleaned up stale comments");
        Ok(ids.len())
    }

    fn import_thread(&self, thread: &Thread) -> Result<()> {
        self.executor.execute(
            &self.sql.insert_thread,
            &[
                SqlValue::Id(thread.id),
                SqlValue::Text(thread.path.clone()),
                SqlValue::Time(thread.created_at),
            ],
        )?;
        Ok(())
    }

    fn import_comment(&self, comment: &Comment) -> Result<()> {
        self.insert_comment(comment)
    }

    fn dialect(&self) -> &'static str {
        self.dialect.name()
    }
}

/// Open the SQLite driver described by `config`.
///
/// # Errors
///
/// Returns `Error::Config` if no path is configured and no data directory
/// exists, or an error if the database file cannot be opened.
pub fn open_sqlite(config: &DatabaseConfig) -> Result<RelationalStorage<SqliteExecutor>> {
    let path = config.sqlite_path().ok_or_else(|| {
        Error::Config("no SQLite database configured and no data directory found".to_string())
    })?;
    let executor = if path.as_os_str() == SQLITE_MEMORY {
        SqliteExecutor::open_memory()?
    } else {
        SqliteExecutor::open(&path)?
    };
    debug!(path = %path.display(), "Opening SQLite database");
    Ok(RelationalStorage::new(
        executor,
        SqlDialect::SQLITE,
        config.table_prefix(),
    ))
}

/// Connect the Postgres driver described by `config`.
///
/// # Errors
///
/// Returns an error if the server cannot be reached.
#[cfg(feature = "postgres")]
pub fn open_postgres(config: &DatabaseConfig) -> Result<RelationalStorage<PostgresExecutor>> {
    Ok(RelationalStorage::new(
        PostgresExecutor::connect(config)?,
        SqlDialect::POSTGRES,
        config.table_prefix(),
    ))
}

/// Connect the MySQL driver described by `config`.
///
/// # Errors
///
/// Returns an error if the server cannot be reached.
#[cfg(feature = "mysql")]
pub fn open_mysql(config: &DatabaseConfig) -> Result<RelationalStorage<MysqlExecutor>> {
    Ok(RelationalStorage::new(
        MysqlExecutor::connect(config)?,
        SqlDialect::MYSQL,
        config.table_prefix(),
    ))
}
