//! Dump writer.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::dump::types::{DumpHeader, DumpResult, ExportStats};
use crate::storage::Storage;

/// Records written between explicit flushes.
pub const FLUSH_EVERY: usize = 100;

/// Writes every thread and comment of a store as a dump.
pub struct Exporter<'a> {
    storage: &'a dyn Storage,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    /// Write a dump to `out`.
    ///
    /// Output is buffered and flushed every [`FLUSH_EVERY`] records.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or `out` fails.
    pub fn export<W: Write>(&self, out: W) -> DumpResult<ExportStats> {
        let threads = self.storage.get_all_threads()?;
        let comments = self.storage.get_all_comments()?;

        let mut writer = CountingWriter::new(BufWriter::new(out));
        let header = DumpHeader {
            thread_count: threads.len(),
            comment_count: comments.len(),
        };
        write_line(&mut writer, &header)?;

        let mut written = 0;
        for thread in &threads {
            write_line(&mut writer, thread)?;
            written += 1;
            if written % FLUSH_EVERY == 0 {
                writer.flush()?;
            }
        }
        for comment in &comments {
            write_line(&mut writer, comment)?;
            written += 1;
            if written % FLUSH_EVERY == 0 {
                writer.flush()?;
                debug!(written, "Dump progress");
            }
        }
        writer.flush()?;

        let stats = ExportStats {
            threads: threads.len(),
            comments: comments.len(),
            bytes: writer.bytes,
        };
        info!(
            dialect = self.storage.dialect(),
            threads = stats.threads,
            comments = stats.comments,
            "Exported dump"
        );
        Ok(stats)
    }
}

fn write_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> DumpResult<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Tracks how many bytes passed through.
struct CountingWriter<W> {
    inner: W,
    bytes: u64,
}

impl<W> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Export `storage` to `path` atomically.
///
/// The dump is written to a temporary sibling, synced to disk and renamed
/// over `path`, so a failed export never leaves a partial file behind.
///
/// # Errors
///
/// Returns an error if the store cannot be read or the file cannot be written.
pub fn export_to_file(storage: &dyn Storage, path: &Path) -> DumpResult<ExportStats> {
    let temp_path = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(&temp_path)?;
    let stats = match Exporter::new(storage).export(&file) {
        Ok(stats) => stats,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    };
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(stats)
}
