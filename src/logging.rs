//! Tracing setup for binaries and tools embedding the engine.

use tracing_subscriber::EnvFilter;

/// Filter directives for a verbosity level.
///
/// Driver crates stay one level quieter than the engine at debug.
#[must_use]
pub fn filter_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug,rusqlite=info,sqlx=info,aws_config=info,aws_smithy_runtime=info,hyper=info",
        _ => "trace",
    }
}

/// Install a stderr subscriber.
///
/// `RUST_LOG` wins over `verbose` when set. `quiet` installs nothing. If a
/// subscriber is already installed (for example by the host application)
/// it is left in place.
pub fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter_directives(verbose))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}
