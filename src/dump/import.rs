//! Dump reader and cross-backend migration.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::info;

use crate::dump::export::Exporter;
use crate::dump::types::{
    DumpError, DumpHeader, DumpRecord, DumpResult, ExportStats, ImportStats, RecordKind,
};
use crate::storage::Storage;

/// Read a dump, handing each record to `insert` in file order.
///
/// Exactly the header's thread and comment counts are read; anything after
/// them is ignored. Stops at the first failure, naming its line.
///
/// # Errors
///
/// Returns `DumpError::Header` for a bad first line, `InvalidRecord` or
/// `Insert` for a failing record, and `Truncated` if the input ends early.
pub fn restore<R, F>(reader: R, mut insert: F) -> DumpResult<ImportStats>
where
    R: BufRead,
    F: FnMut(DumpRecord) -> crate::Result<()>,
{
    let mut lines = reader.lines();
    let header: DumpHeader = match lines.next() {
        Some(line) => serde_json::from_str(&line?).map_err(|e| DumpError::Header {
            message: e.to_string(),
        })?,
        None => {
            return Err(DumpError::Header {
                message: "dump is empty".to_string(),
            });
        }
    };
    let expected = header.thread_count + header.comment_count;

    let mut stats = ImportStats::default();
    let mut line_number = 1;
    let mut next_record = |kind: RecordKind| -> DumpResult<(usize, String)> {
        line_number += 1;
        match lines.next() {
            Some(Ok(text)) => Ok((line_number, text)),
            Some(Err(e)) => Err(DumpError::InvalidRecord {
                kind,
                line: line_number,
                message: e.to_string(),
            }),
            None => Err(DumpError::Truncated {
                line: line_number,
                expected,
            }),
        }
    };

    for _ in 0..header.thread_count {
        let (line, text) = next_record(RecordKind::Thread)?;
        let thread = decode(&text, RecordKind::Thread, line)?;
        insert(DumpRecord::Thread(thread)).map_err(|source| DumpError::Insert {
            kind: RecordKind::Thread,
            line,
            source,
        })?;
        stats.threads += 1;
    }
    for _ in 0..header.comment_count {
        let (line, text) = next_record(RecordKind::Comment)?;
        let comment = decode(&text, RecordKind::Comment, line)?;
        insert(DumpRecord::Comment(comment)).map_err(|source| DumpError::Insert {
            kind: RecordKind::Comment,
            line,
            source,
        })?;
        stats.comments += 1;
    }

    Ok(stats)
}

fn decode<T: DeserializeOwned>(text: &str, kind: RecordKind, line: usize) -> DumpResult<T> {
    serde_json::from_str(text).map_err(|e| DumpError::InvalidRecord {
        kind,
        line,
        message: e.to_string(),
    })
}

/// Restores dumps into a store, keeping ids and timestamps.
///
/// Restoring into a non-empty store can collide with existing rows; the
/// importer does not deduplicate.
pub struct Importer<'a> {
    storage: &'a dyn Storage,
}

impl<'a> Importer<'a> {
    #[must_use]
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    /// Restore a dump read from `reader`.
    ///
    /// # Errors
    ///
    /// See [`restore`].
    pub fn import_into<R: BufRead>(&self, reader: R) -> DumpResult<ImportStats> {
        let stats = restore(reader, |record| match record {
            DumpRecord::Thread(thread) => self.storage.import_thread(&thread),
            DumpRecord::Comment(comment) => self.storage.import_comment(&comment),
        })?;
        info!(
            dialect = self.storage.dialect(),
            threads = stats.threads,
            comments = stats.comments,
            "Imported dump"
        );
        Ok(stats)
    }
}

/// Restore the dump at `path` into `storage`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, or see [`restore`].
pub fn import_file(storage: &dyn Storage, path: &Path) -> DumpResult<ImportStats> {
    let file = File::open(path)?;
    Importer::new(storage).import_into(BufReader::new(file))
}

/// Copy every thread and comment from `source` into `target`.
///
/// Used to move between backends, e.g. from SQLite to DynamoDB.
///
/// # Errors
///
/// Returns an error if either store fails.
pub fn migrate(source: &dyn Storage, target: &dyn Storage) -> DumpResult<ImportStats> {
    let mut buffer = Vec::new();
    let ExportStats {
        threads, comments, ..
    } = Exporter::new(source).export(&mut buffer)?;
    let stats = Importer::new(target).import_into(Cursor::new(buffer))?;
    info!(
        from = source.dialect(),
        to = target.dialect(),
        threads,
        comments,
        "Migrated data"
    );
    Ok(stats)
}
