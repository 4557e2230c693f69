//! Key-value driver.
//!
//! Threads live in one table keyed by `Path`, comments in another keyed by
//! `ID`. Nothing else is indexed, so listing a thread's comments, finding
//! replies and cleanup sweeps are filtered scans. Every write touches one
//! item; operations spanning several items (cascading deletes) are a
//! sequence of such writes and can be interrupted half way.

mod client;
mod memory;

#[cfg(feature = "dynamodb")]
mod dynamodb;

pub use client::{Item, ItemUpdate, KvClient, ScanFilter, TableSpec, matches_filter};
pub use memory::MemoryKvClient;

#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbClient;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::model::{self, Comment, Thread};
use crate::storage::{
    CleanupKind, Storage, cleanup_threshold, hard_delete_all, resolve_reply_target,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const THREAD_TABLE: &str = "commentary_thread";
const COMMENT_TABLE: &str = "commentary_comment";
const THREAD_KEY: &str = "Path";
const COMMENT_KEY: &str = "ID";

const TABLE_READY_ATTEMPTS: u32 = 60;
const TABLE_READY_INTERVAL: Duration = Duration::from_secs(1);

/// Provisioned throughput for the two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    pub thread_read: i64,
    pub thread_write: i64,
    pub comment_read: i64,
    pub comment_write: i64,
}

impl Default for Throughput {
    fn default() -> Self {
        Self {
            thread_read: 1,
            thread_write: 1,
            comment_read: 1,
            comment_write: 1,
        }
    }
}

impl Throughput {
    /// Units from a validated config; unset values fall back to 1.
    #[must_use]
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            thread_read: config.dynamodb_thread_read_units.unwrap_or(1),
            thread_write: config.dynamodb_thread_write_units.unwrap_or(1),
            comment_read: config.dynamodb_comment_read_units.unwrap_or(1),
            comment_write: config.dynamodb_comment_write_units.unwrap_or(1),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ThreadItem {
    path: String,
    #[serde(rename = "ID")]
    id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<&Thread> for ThreadItem {
    fn from(t: &Thread) -> Self {
        Self {
            path: t.path.clone(),
            id: t.id,
            created_at: t.created_at,
        }
    }
}

impl From<ThreadItem> for Thread {
    fn from(t: ThreadItem) -> Self {
        Self {
            id: t.id,
            path: t.path,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CommentItem {
    #[serde(rename = "ID")]
    id: Uuid,
    thread_id: Uuid,
    body: String,
    author: String,
    confirmed: bool,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<Uuid>,
}

impl From<&Comment> for CommentItem {
    fn from(c: &Comment) -> Self {
        Self {
            id: c.id,
            thread_id: c.thread_id,
            body: c.body.clone(),
            author: c.author.clone(),
            confirmed: c.confirmed,
            created_at: c.created_at,
            deleted_at: c.deleted_at,
            reply_to: c.reply_to,
        }
    }
}

impl From<CommentItem> for Comment {
    fn from(c: CommentItem) -> Self {
        Self {
            id: c.id,
            thread_id: c.thread_id,
            body: c.body,
            author: c.author,
            confirmed: c.confirmed,
            created_at: c.created_at,
            deleted_at: c.deleted_at,
            reply_to: c.reply_to,
        }
    }
}

fn to_item<T: Serialize>(value: &T) -> Result<Item> {
    match serde_json::to_value(value)? {
        Value::Object(item) => Ok(item),
        other => Err(Error::Backend(format!("expected an object item, got {other}"))),
    }
}

fn from_item<T: DeserializeOwned>(item: Item) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(item))?)
}

fn id_value(id: Uuid) -> Value {
    Value::String(id.to_string())
}

fn time_value(at: DateTime<Utc>) -> Result<Value> {
    Ok(serde_json::to_value(at)?)
}

/// The key-value [`Storage`] driver.
pub struct KvStorage<C> {
    client: C,
    threads: TableSpec,
    comments: TableSpec,
    ready_attempts: u32,
    ready_interval: Duration,
}

impl<C: KvClient> KvStorage<C> {
    /// Wrap a client. Tables are created by [`Storage::initialize_database`].
    pub fn new(client: C, table_prefix: &str, throughput: Throughput) -> Self {
        Self {
            client,
            threads: TableSpec {
                name: format!("{table_prefix}{THREAD_TABLE}"),
                key: THREAD_KEY,
                read_units: throughput.thread_read,
                write_units: throughput.thread_write,
            },
            comments: TableSpec {
                name: format!("{table_prefix}{COMMENT_TABLE}"),
                key: COMMENT_KEY,
                read_units: throughput.comment_read,
                write_units: throughput.comment_write,
            },
            ready_attempts: TABLE_READY_ATTEMPTS,
            ready_interval: TABLE_READY_INTERVAL,
        }
    }

    /// Override how long table creation waits for the store to report ready.
    #[must_use]
    pub fn with_ready_wait(mut self, attempts: u32, interval: Duration) -> Self {
        self.ready_attempts = attempts;
        self.ready_interval = interval;
        self
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    #[must_use]
    pub fn thread_table(&self) -> &str {
        &self.threads.name
    }

    #[must_use]
    pub fn comment_table(&self) -> &str {
        &self.comments.name
    }

    fn wait_until_ready(&self, table: &str) -> Result<()> {
        for _ in 0..self.ready_attempts {
            if self.client.table_ready(table)? {
                return Ok(());
            }
            thread::sleep(self.ready_interval);
        }
        Err(Error::Backend(format!(
            "table {table} did not become active after {} attempts",
            self.ready_attempts
        )))
    }

    fn comment_items(&self, filter: ScanFilter<'_>) -> Result<Vec<Comment>> {
        self.client
            .scan(&self.comments.name, filter)?
            .into_iter()
            .map(|item| from_item::<CommentItem>(item).map(Comment::from))
            .collect()
    }

    fn replies_of(&self, id: Uuid) -> Result<Vec<Comment>> {
        self.comment_items(&[("ReplyTo", id_value(id))])
    }

    fn update(&self, id: Uuid, update: &ItemUpdate) -> Result<()> {
        let key = id.to_string();
        if self
            .client
            .update_item(&self.comments.name, COMMENT_KEY, &key, update)?
        {
            Ok(())
        } else {
            Err(Error::CommentNotFound { id })
        }
    }
}

impl<C: KvClient> Storage for KvStorage<C> {
    fn initialize_database(&self) -> Result<()> {
        let existing = self.client.list_tables()?;
        for table in [&self.threads, &self.comments] {
            if existing.contains(&table.name) {
                continue;
            }
            self.client.create_table(table)?;
            self.wait_until_ready(&table.name)?;
            info!(table = %table.name, "Created table");
        }
        Ok(())
    }

    fn create_thread(&self, path: &str) -> Result<Uuid> {
        let thread = Thread::new(path.to_string());
        let item = to_item(&ThreadItem::from(&thread))?;
        if self
            .client
            .put_item_if_absent(&self.threads.name, THREAD_KEY, item)?
        {
            debug!(path, id = %thread.id, "Created thread");
            return Ok(thread.id);
        }
        Ok(self.get_thread(path)?.id)
    }

    fn get_thread(&self, path: &str) -> Result<Thread> {
        match self.client.get_item(&self.threads.name, THREAD_KEY, path)? {
            Some(item) => Ok(from_item::<ThreadItem>(item)?.into()),
            None => Err(Error::ThreadNotFound {
                path: path.to_string(),
            }),
        }
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
        self.import_comment(&comment)?;
        Ok(comment.id)
    }

    fn get_comment(&self, id: Uuid) -> Result<Comment> {
        match self
            .client
            .get_item(&self.comments.name, COMMENT_KEY, &id.to_string())?
        {
            Some(item) => Ok(from_item::<CommentItem>(item)?.into()),
            None => Err(Error::CommentNotFound { id }),
        }
    }

    fn get_comments_by_thread(&self, path: &str) -> Result<Vec<Comment>> {
        let thread = self.get_thread(path)?;
        let mut comments: Vec<Comment> = self
            .comment_items(&[("ThreadId", id_value(thread.id))])?
            .into_iter()
            .filter(Comment::is_visible)
            .collect();
        model::sort_comments(&mut comments);
        Ok(comments)
    }

    fn update_comment(&self, id: Uuid, body: &str, author: &str, confirmed: bool) -> Result<()> {
        let update = ItemUpdate::default()
            .set("Body", json!(body))
            .set("Author", json!(author))
            .set("Confirmed", json!(confirmed));
        self.update(id, &update)
    }

    fn delete_comment(&self, id: Uuid) -> Result<()> {
        let update = ItemUpdate::default().set("DeletedAt", time_value(model::now())?);
        self.update(id, &update)?;

        for reply in self.replies_of(id)? {
            match self.update(reply.id, &update) {
                Ok(()) | Err(Error::CommentNotFound { .. }) => {}
                Err(e) => {
                    warn!(%id, reply = %reply.id, error = %e, "Cascading delete interrupted");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn restore_deleted_comment(&self, id: Uuid) -> Result<()> {
        self.update(id, &ItemUpdate::default().remove("DeletedAt"))
    }

    fn hard_delete_comment(&self, id: Uuid) -> Result<()> {
        if !self
            .client
            .delete_item(&self.comments.name, COMMENT_KEY, &id.to_string())?
        {
            return Err(Error::CommentNotFound { id });
        }

        let replies = self.replies_of(id)?;
        for reply in &replies {
            self.client
                .delete_item(&self.comments.name, COMMENT_KEY, &reply.id.to_string())?;
        }
        debug!(%id, replies = replies.len(), "Hard-deleted comment");
        Ok(())
    }

    fn get_all_threads(&self) -> Result<Vec<Thread>> {
        let mut threads = self
            .client
            .scan(&self.threads.name, &[])?
            .into_iter()
            .map(|item| from_item::<ThreadItem>(item).map(Thread::from))
            .collect::<Result<Vec<_>>>()?;
        model::sort_threads(&mut threads);
        Ok(threads)
    }

    fn get_all_comments(&self) -> Result<Vec<Comment>> {
        let mut comments = self.comment_items(&[])?;
        model::sort_comments(&mut comments);
        Ok(comments)
    }

    fn clean_up_stale_data(&self, kind: CleanupKind, older_than_secs: i64) -> Result<usize> {
        let threshold = cleanup_threshold(older_than_secs);
        let ids: Vec<Uuid> = match kind {
            CleanupKind::Unconfirmed => self
                .comment_items(&[("Confirmed", json!(false))])?
                .into_iter()
                .filter(|c| c.deleted_at.is_none() && c.created_at <= threshold)
                .map(|c| c.id)
                .collect(),
            CleanupKind::Deleted => self
                .comment_items(&[])?
                .into_iter()
                .filter(|c| c.deleted_at.is_some_and(|at| at <= threshold))
                .map(|c| c.id)
                .collect(),
        };

        hard_delete_all(self, &ids)?;
        debug!(%kind, removed = ids.len(), "Cleaned up stale comments");
        Ok(ids.len())
    }

    fn import_thread(&self, thread: &Thread) -> Result<()> {
        let item = to_item(&ThreadItem::from(thread))?;
        if self
            .client
            .put_item_if_absent(&self.threads.name, THREAD_KEY, item)?
        {
            return Ok(());
        }
        Err(Error::Backend(format!("thread {} already exists", thread.path)))
    }

    fn import_comment(&self, comment: &Comment) -> Result<()> {
        let item = to_item(&CommentItem::from(comment))?;
        if self
            .client
            .put_item_if_absent(&self.comments.name, COMMENT_KEY, item)?
        {
            return Ok(());
        }
        Err(Error::Backend(format!("comment {} already exists", comment.id)))
    }

    fn dialect(&self) -> &'static str {
        C::NAME
    }
}

/// Open the DynamoDB driver described by `config`.
///
/// # Errors
///
/// Returns an error if the client cannot be built.
#[cfg(feature = "dynamodb")]
pub fn open_dynamodb(config: &DatabaseConfig) -> Result<KvStorage<DynamoDbClient>> {
    let client = DynamoDbClient::connect(config)?;
    Ok(KvStorage::new(
        client,
        config.table_prefix(),
        Throughput::from_config(config),
    ))
}
