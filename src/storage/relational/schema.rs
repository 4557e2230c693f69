//! Per-dialect schema definitions.
//!
//! Identifiers and timestamps use each engine's natural types:
//! - SQLite: 16-byte BLOB ids, INTEGER timestamps (Unix microseconds)
//! - Postgres: UUID ids, TIMESTAMPTZ timestamps
//! - MySQL: CHAR(36) ids, DATETIME(6) timestamps (UTC)
//!
//! Every statement is idempotent so the whole set runs on each startup.

use super::dialect::{SqlDialect, TableNames};
use crate::config::Dialect;

/// Schema version recorded in the migrations table.
pub const CURRENT_SCHEMA_VERSION: &str = "001_threads_and_comments";

/// DDL statements for `dialect`, in execution order.
#[must_use]
pub fn schema_statements(dialect: SqlDialect, tables: &TableNames) -> Vec<String> {
    match dialect.dialect() {
        Dialect::Postgres => postgres(tables),
        Dialect::Mysql => mysql(tables),
        Dialect::Sqlite3 | Dialect::DynamoDb => sqlite(tables),
    }
}

fn sqlite(tables: &TableNames) -> Vec<String> {
    let TableNames {
        threads,
        comments,
        migrations,
    } = tables;
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {migrations} (
                version TEXT PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {threads} (
                id BLOB PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {comments} (
                id BLOB PRIMARY KEY,
                thread_id BLOB NOT NULL REFERENCES {threads}(id),
                body TEXT NOT NULL,
                author TEXT NOT NULL,
                confirmed INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                deleted_at INTEGER,
                reply_to BLOB
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{comments}_thread ON {comments}(thread_id, confirmed)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{comments}_reply_to ON {comments}(reply_to)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{comments}_created ON {comments}(created_at)"),
    ]
}

fn postgres(tables: &TableNames) -> Vec<String> {
    let TableNames {
        threads,
        comments,
        migrations,
    } = tables;
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {migrations} (
                version VARCHAR(64) PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {threads} (
                id UUID PRIMARY KEY,
                path VARCHAR(1024) NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {comments} (
                id UUID PRIMARY KEY,
                thread_id UUID NOT NULL REFERENCES {threads}(id),
                body TEXT NOT NULL,
                author VARCHAR(255) NOT NULL,
                confirmed BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                deleted_at TIMESTAMPTZ NULL,
                reply_to UUID NULL
            )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{comments}_thread ON {comments}(thread_id, confirmed)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{comments}_reply_to ON {comments}(reply_to)"),
        format!("CREATE INDEX IF NOT EXISTS idx_{comments}_created ON {comments}(created_at)"),
    ]
}

// MySQL has no CREATE INDEX IF NOT EXISTS; indexes live in the table DDL.
fn mysql(tables: &TableNames) -> Vec<String> {
    let TableNames {
        threads,
        comments,
        migrations,
    } = tables;
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {migrations} (
                version VARCHAR(64) PRIMARY KEY,
                applied_at DATETIME(6) NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {threads} (
                id CHAR(36) PRIMARY KEY,
                path VARCHAR(255) NOT NULL,
                created_at DATETIME(6) NOT NULL,
                UNIQUE KEY uq_{threads}_path (path)
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {comments} (
                id CHAR(36) PRIMARY KEY,
                thread_id CHAR(36) NOT NULL,
                body TEXT NOT NULL,
                author VARCHAR(255) NOT NULL,
                confirmed BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME(6) NOT NULL,
                deleted_at DATETIME(6) NULL,
                reply_to CHAR(36) NULL,
                INDEX idx_{comments}_thread (thread_id, confirmed),
                INDEX idx_{comments}_reply_to (reply_to),
                INDEX idx_{comments}_created (created_at),
                FOREIGN KEY (thread_id) REFERENCES {threads}(id)
            )"
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_sqlite_schema_applies_twice() {
        let conn = Connection::open_in_memory().unwrap();
        let tables = TableNames::with_prefix("");
        for _ in 0..2 {
            for statement in schema_statements(SqlDialect::SQLITE, &tables) {
                conn.execute_batch(&statement).unwrap();
            }
        }

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('threads', 'comments', 'schema_migrations')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_prefix_reaches_every_statement() {
        let tables = TableNames::with_prefix("blog_");
        for dialect in [SqlDialect::SQLITE, SqlDialect::POSTGRES, SqlDialect::MYSQL] {
            for statement in schema_statements(dialect, &tables) {
                assert!(statement.contains("blog_"), "{statement}");
            }
        }
    }

    #[test]
    fn test_mysql_has_no_standalone_indexes() {
        let statements = schema_statements(SqlDialect::MYSQL, &TableNames::with_prefix(""));
        assert!(statements.iter().all(|s| !s.starts_with("CREATE INDEX")));
    }
}
