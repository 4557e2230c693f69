//! Background retention sweeps.
//!
//! Each enabled retention rule gets its own thread that sleeps for the
//! rule's period and then asks the storage to remove stale comments. A
//! failing or panicking sweep is logged and the loop carries on; the jobs
//! run until the process exits.

use crate::config::{RetentionConfig, RetentionRule};
use crate::error::Result;
use crate::storage::{CleanupKind, Storage};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Observability handle for a running cleanup job.
///
/// Dropping it does not stop the job.
#[derive(Debug)]
pub struct CleanupJob {
    kind: CleanupKind,
    period: Duration,
    sweeps: Arc<AtomicU64>,
}

impl CleanupJob {
    #[must_use]
    pub fn kind(&self) -> CleanupKind {
        self.kind
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of completed ticks, successful or not.
    #[must_use]
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }
}

/// Start one background job per enabled retention rule.
///
/// # Errors
///
/// Returns `Error::Config` if an enabled rule has no timeout; no job is
/// started in that case. Also fails if the OS refuses to spawn a thread.
pub fn start_cleanup_jobs(
    storage: Arc<dyn Storage>,
    config: &RetentionConfig,
) -> Result<Vec<CleanupJob>> {
    let rules = config.rules()?;
    if rules.is_empty() {
        debug!("Retention disabled, no cleanup jobs started");
    }
    rules
        .into_iter()
        .map(|rule| spawn_rule(Arc::clone(&storage), rule))
        .collect()
}

pub(crate) fn spawn_rule(storage: Arc<dyn Storage>, rule: RetentionRule) -> Result<CleanupJob> {
    let sweeps = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&sweeps);
    let RetentionRule {
        kind,
        older_than_secs,
        period,
    } = rule;

    thread::Builder::new()
        .name(format!("cleanup-{kind}"))
        .spawn(move || sweep_loop(storage.as_ref(), kind, older_than_secs, period, &counter))?;

    info!(%kind, older_than_secs, period_secs = period.as_secs(), "Started cleanup job");
    Ok(CleanupJob {
        kind,
        period,
        sweeps,
    })
}

fn sweep_loop(
    storage: &dyn Storage,
    kind: CleanupKind,
    older_than_secs: i64,
    period: Duration,
    sweeps: &AtomicU64,
) {
    loop {
        thread::sleep(period);
        run_sweep(storage, kind, older_than_secs);
        sweeps.fetch_add(1, Ordering::Relaxed);
    }
}

/// Run one sweep, absorbing errors and panics.
///
/// Returns the number of removed comments, or `None` if the sweep failed.
pub fn run_sweep(storage: &dyn Storage, kind: CleanupKind, older_than_secs: i64) -> Option<usize> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        storage.clean_up_stale_data(kind, older_than_secs)
    }));
    match outcome {
        Ok(Ok(removed)) => {
            if removed > 0 {
                info!(%kind, removed, "Removed stale comments");
            } else {
                debug!(%kind, "Nothing to clean up");
            }
            Some(removed)
        }
        Ok(Err(e)) => {
            warn!(%kind, error = %e, "Cleanup sweep failed");
            None
        }
        Err(_) => {
            error!(%kind, "Cleanup sweep panicked");
            None
        }
    }
}
