//! MySQL executor built on a sqlx connection pool.
//!
//! Ids travel as 36-character strings and timestamps as naive UTC
//! `DATETIME(6)` values. Like the Postgres executor it blocks on an owned
//! tokio runtime.

use super::{SqlExecutor, SqlValue};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::model::{Comment, Thread};

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::query::Query;
use sqlx::{MySql, Row};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::info;
use uuid::Uuid;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs statements against a MySQL server.
pub struct MysqlExecutor {
    runtime: Runtime,
    pool: MySqlPool,
}

impl MysqlExecutor {
    /// Connect using the host, port, credentials and database in `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for missing fields and `Error::Sqlx` if the
    /// server cannot be reached.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let (Some(host), Some(port), Some(database), Some(username)) = (
            config.host.as_deref(),
            config.port,
            config.database.as_deref(),
            config.username.as_deref(),
        ) else {
            return Err(Error::Config(
                "mysql requires host, port, database and username".to_string(),
            ));
        };

        let ssl_mode = if config.ssl_enabled == Some(false) {
            MySqlSslMode::Disabled
        } else {
            MySqlSslMode::Preferred
        };
        let options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .database(database)
            .username(username)
            .password(config.password.as_deref().unwrap_or_default())
            .ssl_mode(ssl_mode)
            .timezone(Some("+00:00".to_string()));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let pool = runtime.block_on(
            MySqlPoolOptions::new()
                .max_connections(config.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
                .acquire_timeout(CONNECT_TIMEOUT)
                .connect_with(options),
        )?;

        info!(host, port, database, "Connected to mysql");
        Ok(Self { runtime, pool })
    }

    fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<MySqlRow>> {
        Ok(self
            .runtime
            .block_on(bind(sqlx::query(sql), params).fetch_all(&self.pool))?)
    }
}

fn bind<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [SqlValue],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            SqlValue::Id(id) => query.bind(id.to_string()),
            SqlValue::OptId(id) => query.bind(id.map(|id| id.to_string())),
            SqlValue::Text(text) => query.bind(text.as_str()),
            SqlValue::Bool(flag) => query.bind(*flag),
            SqlValue::Time(at) => query.bind(at.naive_utc()),
            SqlValue::OptTime(at) => query.bind(at.map(|at| at.naive_utc())),
        };
    }
    query
}

fn id_at(row: &MySqlRow, idx: usize) -> sqlx::Result<Uuid> {
    let text: String = row.try_get(idx)?;
    Uuid::parse_str(&text).map_err(|e| sqlx::Error::ColumnDecode {
        index: idx.to_string(),
        source: Box::new(e),
    })
}

fn opt_id_at(row: &MySqlRow, idx: usize) -> sqlx::Result<Option<Uuid>> {
    let text: Option<String> = row.try_get(idx)?;
    text.map(|text| {
        Uuid::parse_str(&text).map_err(|e| sqlx::Error::ColumnDecode {
            index: idx.to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

fn time_at(row: &MySqlRow, idx: usize) -> sqlx::Result<DateTime<Utc>> {
    Ok(row.try_get::<NaiveDateTime, _>(idx)?.and_utc())
}

fn opt_time_at(row: &MySqlRow, idx: usize) -> sqlx::Result<Option<DateTime<Utc>>> {
    Ok(row
        .try_get::<Option<NaiveDateTime>, _>(idx)?
        .map(|at| at.and_utc()))
}

fn map_thread(row: &MySqlRow) -> sqlx::Result<Thread> {
    Ok(Thread {
        id: id_at(row, 0)?,
        path: row.try_get(1)?,
        created_at: time_at(row, 2)?,
    })
}

fn map_comment(row: &MySqlRow) -> sqlx::Result<Comment> {
    Ok(Comment {
        id: id_at(row, 0)?,
        thread_id: id_at(row, 1)?,
        body: row.try_get(2)?,
        author: row.try_get(3)?,
        confirmed: row.try_get(4)?,
        created_at: time_at(row, 5)?,
        deleted_at: opt_time_at(row, 6)?,
        reply_to: opt_id_at(row, 7)?,
    })
}

impl SqlExecutor for MysqlExecutor {
    // MySQL commits DDL implicitly, so there is no transaction to wrap these in.
    fn execute_batch(&self, statements: &[String]) -> Result<()> {
        self.runtime.block_on(async {
            for statement in statements {
                sqlx::query(statement).execute(&self.pool).await?;
            }
            Ok(())
        })
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = self
            .runtime
            .block_on(bind(sqlx::query(sql), params).execute(&self.pool))?;
        Ok(result.rows_affected())
    }

    fn query_threads(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Thread>> {
        let rows = self.fetch_all(sql, params)?;
        Ok(rows.iter().map(map_thread).collect::<sqlx::Result<_>>()?)
    }

    fn query_comments(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Comment>> {
        let rows = self.fetch_all(sql, params)?;
        Ok(rows.iter().map(map_comment).collect::<sqlx::Result<_>>()?)
    }
}
