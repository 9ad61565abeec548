//! Logging and tracing configuration
//!
//! Provides structured logging for test runs. Console output is compact;
//! the optional run log file carries full detail (thread ids, source
//! locations) so a failed run can be analysed after the fact.

use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "dts=info,warn";

/// Name of the run log file inside the output directory
pub const RUN_LOG_NAME: &str = "dts.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize tracing for console (stderr) logging
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()
        .is_ok()
}

/// Initialize tracing for console and a run log file in `output_dir`
///
/// Returns the path of the log file, or `None` if the directory could not be
/// created or a subscriber was already installed.
pub fn init_with_file(output_dir: &Path) -> Option<PathBuf> {
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        eprintln!("Warning: Could not create output directory: {}", e);
        init();
        return None;
    }

    let file_appender = tracing_appender::rolling::never(output_dir, RUN_LOG_NAME);

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .ok()
        .map(|_| output_dir.join(RUN_LOG_NAME))
}
