//! Configuration for the storage engine.
//!
//! Two sections are consumed here:
//! - [`DatabaseConfig`] selects and parameterizes the backend
//! - [`RetentionConfig`] drives the background cleanup jobs
//!
//! Loading the configuration (files, flags) is the host's job; every type
//! derives `Deserialize` with camelCase field names so a JSON config from
//! the earlier engine can be fed in unchanged. Validation errors are
//! [`Error::Config`] and are meant to stop the process at startup.

use crate::error::{Error, Result};
use crate::storage::CleanupKind;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Interval used by a cleanup rule whose period is left at zero (one day).
pub const DEFAULT_CLEANUP_PERIOD_SECS: u64 = 86_400;

/// Path that selects a private in-memory SQLite database.
pub const SQLITE_MEMORY: &str = ":memory:";

/// Root configuration consumed by the storage engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

// ── Dialect ───────────────────────────────────────────────────

/// The backend variant a driver targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite3,
    Postgres,
    Mysql,
    DynamoDb,
}

impl Dialect {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite3 => "sqlite3",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::DynamoDb => "dynamodb",
        }
    }

}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite3" | "sqlite" => Ok(Self::Sqlite3),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "dynamodb" => Ok(Self::DynamoDb),
            _ => Err(Error::Config(format!("unsupported dialect {s}"))),
        }
    }
}

// ── Database ──────────────────────────────────────────────────

/// Backend selection and connection parameters.
///
/// Only the fields relevant to the chosen dialect are read; see
/// [`DatabaseConfig::validate`] for what each dialect requires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// One of `sqlite3`, `postgres`, `mysql`, `dynamodb` (case-insensitive).
    pub dialect: String,

    /// SQLite file path, or the database name on a server.
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// `Some(false)` disables TLS for server dialects.
    pub ssl_enabled: Option<bool>,
    pub max_connections: Option<u32>,

    /// Prepended to every table name.
    pub table_prefix: Option<String>,

    // DynamoDB
    pub aws_region: Option<String>,
    #[serde(rename = "awsAccessKeyID")]
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    /// Custom endpoint, e.g. a local DynamoDB for development.
    #[serde(rename = "dynamoDBEndpoint")]
    pub dynamodb_endpoint: Option<String>,
    #[serde(rename = "dynamoDBThreadReadUnits")]
    pub dynamodb_thread_read_units: Option<i64>,
    #[serde(rename = "dynamoDBThreadWriteUnits")]
    pub dynamodb_thread_write_units: Option<i64>,
    #[serde(rename = "dynamoDBCommentReadUnits")]
    pub dynamodb_comment_read_units: Option<i64>,
    #[serde(rename = "dynamoDBCommentWriteUnits")]
    pub dynamodb_comment_write_units: Option<i64>,
}

impl DatabaseConfig {
    /// Config for a SQLite database at `path` (or [`SQLITE_MEMORY`]).
    #[must_use]
    pub fn sqlite(path: &str) -> Self {
        Self {
            dialect: Dialect::Sqlite3.as_str().to_string(),
            database: Some(path.to_string()),
            ..Self::default()
        }
    }

    /// Parse the configured dialect.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unrecognized dialect.
    pub fn dialect(&self) -> Result<Dialect> {
        self.dialect.parse()
    }

    #[must_use]
    pub fn table_prefix(&self) -> &str {
        self.table_prefix.as_deref().unwrap_or_default()
    }

    /// Where the SQLite database lives: `database` if set, otherwise
    /// [`resolve_sqlite_path`]'s fallbacks.
    #[must_use]
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        let explicit = self
            .database
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        resolve_sqlite_path(explicit.map(Path::new))
    }

    /// Check that every field the dialect needs is present.
    ///
    /// All missing fields are reported together.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` listing the missing fields, or naming the
    /// unsupported dialect.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        let mut require = |present: bool, field: &'static str| {
            if !present {
                missing.push(field);
            }
        };

        match self.dialect()? {
            // Falls back to `COMMENTARY_DB`, then the data directory.
            Dialect::Sqlite3 => {}
            Dialect::Postgres => {
                require(has_text(self.database.as_ref()), "database");
                require(self.username.is_some(), "username");
                require(self.password.is_some(), "password");
                require(has_text(self.host.as_ref()), "host");
            }
            Dialect::Mysql => {
                require(has_text(self.database.as_ref()), "database");
                require(self.username.is_some(), "username");
                require(self.password.is_some(), "password");
                require(has_text(self.host.as_ref()), "host");
                require(self.port.is_some(), "port");
            }
            Dialect::DynamoDb => {
                require(has_text(self.aws_region.as_ref()), "awsRegion");
                require(
                    self.dynamodb_thread_read_units.is_some(),
                    "dynamoDBThreadReadUnits",
                );
                require(
                    self.dynamodb_thread_write_units.is_some(),
                    "dynamoDBThreadWriteUnits",
                );
                require(
                    self.dynamodb_comment_read_units.is_some(),
                    "dynamoDBCommentReadUnits",
                );
                require(
                    self.dynamodb_comment_write_units.is_some(),
                    "dynamoDBCommentWriteUnits",
                );
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "{} requires {} in the database config",
                self.dialect.to_lowercase(),
                missing.join(", ")
            )))
        }
    }

    /// AWS credentials, falling back to `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
    ///
    /// `None` leaves credential discovery to the AWS SDK default chain.
    #[must_use]
    pub fn aws_credentials(&self) -> Option<(String, String)> {
        let key = self
            .aws_access_key_id
            .clone()
            .or_else(|| non_empty_env("AWS_ACCESS_KEY_ID"))?;
        let secret = self
            .aws_secret_access_key
            .clone()
            .or_else(|| non_empty_env("AWS_SECRET_ACCESS_KEY"))?;
        Some((key, secret))
    }
}

fn has_text(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the SQLite database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `COMMENTARY_DB` environment variable
/// 3. Per-user data directory: `<data dir>/commentary/commentary.db`
///
/// Returns `None` only when no home directory can be determined.
#[must_use]
pub fn resolve_sqlite_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    sqlite_path_from(explicit_path, non_empty_env("COMMENTARY_DB"))
}

fn sqlite_path_from(explicit_path: Option<&Path>, env_path: Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Some(db_path) = env_path {
        return Some(PathBuf::from(db_path));
    }

    directories::ProjectDirs::from("", "", "commentary")
        .map(|dirs| dirs.data_dir().join("commentary.db"))
}

// ── Retention ─────────────────────────────────────────────────

/// Retention rules for the background cleanup jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub remove_deleted: bool,
    pub remove_unconfirmed: bool,
    /// Soft-deleted comments older than this are purged.
    pub deleted_timeout_seconds: i64,
    /// Unconfirmed comments older than this are purged.
    pub unconfirmed_timeout_seconds: i64,
    /// Zero means [`DEFAULT_CLEANUP_PERIOD_SECS`].
    pub remove_deleted_period_seconds: u64,
    /// Zero means [`DEFAULT_CLEANUP_PERIOD_SECS`].
    pub remove_unconfirmed_period_seconds: u64,
}

/// One enabled cleanup rule, resolved from [`RetentionConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionRule {
    pub kind: CleanupKind,
    pub older_than_secs: i64,
    pub period: Duration,
}

impl RetentionConfig {
    /// Resolve the enabled rules, applying default periods.
    ///
    /// Returns an empty list when retention is disabled.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a removal rule is enabled with a zero
    /// timeout. No rule is returned in that case.
    pub fn rules(&self) -> Result<Vec<RetentionRule>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let mut rules = Vec::new();
        if self.remove_deleted {
            if self.deleted_timeout_seconds == 0 {
                return Err(Error::Config(
                    "deletedTimeoutSeconds not specified but the deleted cleanup job is enabled"
                        .to_string(),
                ));
            }
            rules.push(RetentionRule {
                kind: CleanupKind::Deleted,
                older_than_secs: self.deleted_timeout_seconds,
                period: self.deleted_period(),
            });
        }
        if self.remove_unconfirmed {
            if self.unconfirmed_timeout_seconds == 0 {
                return Err(Error::Config(
                    "unconfirmedTimeoutSeconds not specified but the unconfirmed cleanup job is enabled"
                        .to_string(),
                ));
            }
            rules.push(RetentionRule {
                kind: CleanupKind::Unconfirmed,
                older_than_secs: self.unconfirmed_timeout_seconds,
                period: self.unconfirmed_period(),
            });
        }
        Ok(rules)
    }

    /// Interval between deleted-comment sweeps.
    #[must_use]
    pub fn deleted_period(&self) -> Duration {
        period_or_default(self.remove_deleted_period_seconds)
    }

    /// Interval between unconfirmed-comment sweeps.
    #[must_use]
    pub fn unconfirmed_period(&self) -> Duration {
        period_or_default(self.remove_unconfirmed_period_seconds)
    }

    /// Validate without resolving.
    ///
    /// # Errors
    ///
    /// See [`RetentionConfig::rules`].
    pub fn validate(&self) -> Result<()> {
        self.rules().map(|_| ())
    }
}

fn period_or_default(secs: u64) -> Duration {
    if secs == 0 {
        Duration::from_secs(DEFAULT_CLEANUP_PERIOD_SECS)
    } else {
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_parsing() {
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite3);
        assert_eq!("SQLite".parse::<Dialect>().unwrap(), Dialect::Sqlite3);
        assert_eq!("Postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("MYSQL".parse::<Dialect>().unwrap(), Dialect::Mysql);
        assert_eq!("dynamodb".parse::<Dialect>().unwrap(), Dialect::DynamoDb);

        let err = "oracle".parse::<Dialect>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: unsupported dialect oracle");
    }

    #[test]
    fn test_sqlite_database_is_optional() {
        let mut config = DatabaseConfig::sqlite("comments.db");
        assert!(config.validate().is_ok());
        assert_eq!(config.sqlite_path(), Some(PathBuf::from("comments.db")));

        config.database = Some("  ".to_string());
        assert!(config.validate().is_ok());
        config.database = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mysql_reports_all_missing_fields() {
        let config = DatabaseConfig {
            dialect: "mysql".to_string(),
            database: Some("comments".to_string()),
            ..DatabaseConfig::default()
        };
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("username"));
        assert!(message.contains("password"));
        assert!(message.contains("host"));
        assert!(message.contains("port"));
    }

    #[test]
    fn test_dynamodb_requires_throughput_hints() {
        let mut config = DatabaseConfig {
            dialect: "dynamodb".to_string(),
            aws_region: Some("eu-west-1".to_string()),
            dynamodb_thread_read_units: Some(1),
            dynamodb_thread_write_units: Some(1),
            dynamodb_comment_read_units: Some(2),
            ..DatabaseConfig::default()
        };
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("dynamoDBCommentWriteUnits"));

        config.dynamodb_comment_write_units = Some(2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_dialect_fails_validation() {
        let config = DatabaseConfig {
            dialect: "cassandra".to_string(),
            ..DatabaseConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_deserialize_legacy_field_names() {
        let json = r#"{
            "database": {
                "dialect": "dynamodb",
                "tablePrefix": "blog_",
                "awsRegion": "us-east-1",
                "awsAccessKeyID": "key",
                "awsSecretAccessKey": "secret",
                "dynamoDBThreadReadUnits": 5
            },
            "retention": {
                "enabled": true,
                "removeDeleted": true,
                "deletedTimeoutSeconds": 3600
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.database.dialect().unwrap(), Dialect::DynamoDb);
        assert_eq!(config.database.table_prefix(), "blog_");
        assert_eq!(config.database.dynamodb_thread_read_units, Some(5));
        assert_eq!(
            config.database.aws_credentials(),
            Some(("key".to_string(), "secret".to_string()))
        );
        assert!(config.retention.enabled);
        assert_eq!(config.retention.deleted_timeout_seconds, 3600);
    }

    #[test]
    fn test_retention_disabled_has_no_rules() {
        let config = RetentionConfig {
            enabled: false,
            remove_deleted: true,
            ..RetentionConfig::default()
        };
        assert!(config.rules().unwrap().is_empty());
    }

    #[test]
    fn test_retention_zero_timeout_is_config_error() {
        let config = RetentionConfig {
            enabled: true,
            remove_deleted: true,
            ..RetentionConfig::default()
        };
        let err = config.rules().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("deletedTimeoutSeconds"));

        let config = RetentionConfig {
            enabled: true,
            remove_unconfirmed: true,
            ..RetentionConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("unconfirmedTimeoutSeconds"));
    }

    #[test]
    fn test_retention_periods_default_to_one_day() {
        let config = RetentionConfig {
            enabled: true,
            remove_deleted: true,
            remove_unconfirmed: true,
            deleted_timeout_seconds: 60,
            unconfirmed_timeout_seconds: 120,
            remove_deleted_period_seconds: 0,
            remove_unconfirmed_period_seconds: 30,
        };
        let rules = config.rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].kind, CleanupKind::Deleted);
        assert_eq!(rules[0].older_than_secs, 60);
        assert_eq!(rules[0].period, Duration::from_secs(DEFAULT_CLEANUP_PERIOD_SECS));
        assert_eq!(rules[1].kind, CleanupKind::Unconfirmed);
        assert_eq!(rules[1].period, Duration::from_secs(30));
    }

    #[test]
    fn test_resolve_sqlite_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/comments.db");
        assert_eq!(resolve_sqlite_path(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_sqlite_path_from_env_and_data_dir() {
        let explicit = PathBuf::from("/explicit.db");
        let from_env = Some("/from/env.db".to_string());

        assert_eq!(
            sqlite_path_from(Some(&explicit), from_env.clone()),
            Some(explicit)
        );
        assert_eq!(
            sqlite_path_from(None, from_env),
            Some(PathBuf::from("/from/env.db"))
        );
        if let Some(default) = sqlite_path_from(None, None) {
            assert!(default.ends_with("commentary.db"));
        }
    }
}
