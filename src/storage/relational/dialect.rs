//! SQL dialect parameters and the statement set built from them.
//!
//! Every statement is written once with `?` placeholders and rebound for
//! engines that number their parameters.

use crate::config::Dialect;

/// How an engine spells bind parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` (SQLite, MySQL)
    Question,
    /// `$1`, `$2`, ... (Postgres)
    Dollar,
}

/// The knobs that differ between SQL engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlDialect {
    dialect: Dialect,
    placeholder: Placeholder,
}

impl SqlDialect {
    pub const SQLITE: Self = Self {
        dialect: Dialect::Sqlite3,
        placeholder: Placeholder::Question,
    };
    pub const POSTGRES: Self = Self {
        dialect: Dialect::Postgres,
        placeholder: Placeholder::Dollar,
    };
    pub const MYSQL: Self = Self {
        dialect: Dialect::Mysql,
        placeholder: Placeholder::Question,
    };

    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.dialect.as_str()
    }

    #[must_use]
    pub const fn placeholder(&self) -> Placeholder {
        self.placeholder
    }

    /// Rewrite `?` placeholders into this dialect's style.
    #[must_use]
    pub fn rebind(&self, sql: &str) -> String {
        match self.placeholder {
            Placeholder::Question => sql.to_string(),
            Placeholder::Dollar => {
                let mut out = String::with_capacity(sql.len() + 8);
                let mut n = 0;
                for ch in sql.chars() {
                    if ch == '?' {
                        n += 1;
                        out.push('$');
                        out.push_str(&n.to_string());
                    } else {
                        out.push(ch);
                    }
                }
                out
            }
        }
    }

    /// `INSERT` that silently skips rows violating a unique constraint.
    fn insert_ignore(&self, table: &str, columns: &[&str], conflict: &str) -> String {
        let values = vec!["?"; columns.len()].join(", ");
        let columns = columns.join(", ");
        match self.dialect {
            Dialect::Mysql => format!("INSERT IGNORE INTO {table} ({columns}) VALUES ({values})"),
            _ => format!(
                "INSERT INTO {table} ({columns}) VALUES ({values}) ON CONFLICT ({conflict}) DO NOTHING"
            ),
        }
    }
}

/// Table names after applying the configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub threads: String,
    pub comments: String,
    pub migrations: String,
}

impl TableNames {
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            threads: format!("{prefix}threads"),
            comments: format!("{prefix}comments"),
            migrations: format!("{prefix}schema_migrations"),
        }
    }
}

/// Column list every thread query selects, in decode order.
pub const THREAD_COLUMNS: &str = "id, path, created_at";

/// Column list every comment query selects, in decode order.
pub const COMMENT_COLUMNS: &str =
    "id, thread_id, body, author, confirmed, created_at, deleted_at, reply_to";

/// Every statement the relational driver issues, already rebound.
#[derive(Debug, Clone)]
pub struct Statements {
    pub insert_thread_if_absent: String,
    pub insert_thread: String,
    pub select_thread_by_path: String,
    pub select_threads: String,
    pub insert_comment: String,
    pub select_comment: String,
    pub select_visible_comments: String,
    pub select_comments: String,
    pub update_comment: String,
    pub soft_delete_comment: String,
    pub restore_comment: String,
    pub hard_delete_comment: String,
    pub select_stale_unconfirmed: String,
    pub select_stale_deleted: String,
    pub record_migration: String,
}

impl Statements {
    #[must_use]
    pub fn new(dialect: SqlDialect, tables: &TableNames) -> Self {
        let TableNames {
            threads,
            comments,
            migrations,
        } = tables;
        let sql = |s: String| dialect.rebind(&s);

        Self {
            insert_thread_if_absent: sql(dialect.insert_ignore(
                threads,
                &["id", "path", "created_at"],
                "path",
            )),
            insert_thread: sql(format!(
                "INSERT INTO {threads} ({THREAD_COLUMNS}) VALUES (?, ?, ?)"
            )),
            select_thread_by_path: sql(format!(
                "SELECT {THREAD_COLUMNS} FROM {threads} WHERE path = ?"
            )),
            select_threads: sql(format!(
                "SELECT {THREAD_COLUMNS} FROM {threads} ORDER BY created_at"
            )),
            insert_comment: sql(format!(
                "INSERT INTO {comments} ({COMMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            )),
            select_comment: sql(format!(
                "SELECT {COMMENT_COLUMNS} FROM {comments} WHERE id = ?"
            )),
            select_visible_comments: sql(format!(
                "SELECT {COMMENT_COLUMNS} FROM {comments} \
                 WHERE thread_id = ? AND confirmed = ? AND deleted_at IS NULL \
                 ORDER BY created_at"
            )),
            select_comments: sql(format!(
                "SELECT {COMMENT_COLUMNS} FROM {comments} ORDER BY created_at"
            )),
            update_comment: sql(format!(
                "UPDATE {comments} SET body = ?, author = ?, confirmed = ? WHERE id = ?"
            )),
            soft_delete_comment: sql(format!(
                "UPDATE {comments} SET deleted_at = ? WHERE id = ? OR reply_to = ?"
            )),
            restore_comment: sql(format!(
                "UPDATE {comments} SET deleted_at = NULL WHERE id = ?"
            )),
            hard_delete_comment: sql(format!(
                "DELETE FROM {comments} WHERE id = ? OR reply_to = ?"
            )),
            select_stale_unconfirmed: sql(format!(
                "SELECT {COMMENT_COLUMNS} FROM {comments} \
                 WHERE confirmed = ? AND deleted_at IS NULL AND created_at <= ?"
            )),
            select_stale_deleted: sql(format!(
                "SELECT {COMMENT_COLUMNS} FROM {comments} \
                 WHERE deleted_at IS NOT NULL AND deleted_at <= ?"
            )),
            record_migration: sql(dialect.insert_ignore(
                migrations,
                &["version", "applied_at"],
                "version",
            )),
        }
    }
}
