//! Postgres executor built on a sqlx connection pool.
//!
//! sqlx is async; the executor owns a tokio runtime and blocks on each
//! statement. Do not call it from inside another tokio runtime.

use super::{SqlExecutor, SqlValue};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::model::{Comment, Thread};

use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::info;

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs statements against a Postgres server.
pub struct PostgresExecutor {
    runtime: Runtime,
    pool: PgPool,
}

impl PostgresExecutor {
    /// Connect using the host, credentials and database in `config`.
    ///
    /// `sslEnabled: false` disables TLS; otherwise TLS is preferred.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for missing fields and `Error::Sqlx` if the
    /// server cannot be reached.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let (Some(host), Some(database), Some(username)) = (
            config.host.as_deref(),
            config.database.as_deref(),
            config.username.as_deref(),
        ) else {
            return Err(Error::Config(
                "postgres requires host, database and username".to_string(),
            ));
        };

        let ssl_mode = if config.ssl_enabled == Some(false) {
            PgSslMode::Disable
        } else {
            PgSslMode::Prefer
        };
        let options = PgConnectOptions::new()
            .host(host)
            .port(config.port.unwrap_or(DEFAULT_PORT))
            .database(database)
            .username(username)
            .password(config.password.as_deref().unwrap_or_default())
            .ssl_mode(ssl_mode);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let pool = runtime.block_on(
            PgPoolOptions::new()
                .max_connections(config.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
                .acquire_timeout(CONNECT_TIMEOUT)
                .connect_with(options),
        )?;

        info!(host, database, "Connected to postgres");
        Ok(Self { runtime, pool })
    }

    fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<PgRow>> {
        Ok(self
            .runtime
            .block_on(bind(sqlx::query(sql), params).fetch_all(&self.pool))?)
    }
}

fn bind<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Id(id) => query.bind(*id),
            SqlValue::OptId(id) => query.bind(*id),
            SqlValue::Text(text) => query.bind(text.as_str()),
            SqlValue::Bool(flag) => query.bind(*flag),
            SqlValue::Time(at) => query.bind(*at),
            SqlValue::OptTime(at) => query.bind(*at),
        };
    }
    query
}

fn map_thread(row: &PgRow) -> sqlx::Result<Thread> {
    Ok(Thread {
        id: row.try_get(0)?,
        path: row.try_get(1)?,
        created_at: row.try_get(2)?,
    })
}

fn map_comment(row: &PgRow) -> sqlx::Result<Comment> {
    Ok(Comment {
        id: row.try_get(0)?,
        thread_id: row.try_get(1)?,
        body: row.try_get(2)?,
        author: row.try_get(3)?,
        confirmed: row.try_get(4)?,
        created_at: row.try_get(5)?,
        deleted_at: row.try_get(6)?,
        reply_to: row.try_get(7)?,
    })
}

impl SqlExecutor for PostgresExecutor {
    fn execute_batch(&self, statements: &[String]) -> Result<()> {
        self.runtime.block_on(async {
            let mut tx = self.pool.begin().await?;
            for statement in statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            tx.commit().await?;
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
