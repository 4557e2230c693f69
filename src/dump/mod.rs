//! Line-oriented dump and restore of every thread and comment.
//!
//! A dump is UTF-8 text:
//!
//! ```text
//! {"threadCount":2,"commentCount":3}
//! <thread JSON>        x threadCount
//! <comment JSON>       x commentCount
//! ```
//!
//! There is no checksum and no trailer. Dumps are taken without a snapshot,
//! so concurrent writes during an export can leave it inconsistent.

pub mod export;
pub mod import;
pub mod types;

pub use export::{Exporter, export_to_file};
pub use import::{Importer, import_file, migrate, restore};
pub use types::{DumpError, DumpHeader, DumpRecord, DumpResult, ExportStats, ImportStats, RecordKind};
