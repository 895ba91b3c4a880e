use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// Log targets used across the crate so batch noise can be filtered
// independently of the PDF plumbing.
pub const BATCH: &str = "batch";
pub const MARKERS: &str = "markers";
pub const OVERLAY: &str = "overlay";
pub const FONTS: &str = "fonts";

/// Initialize console logging. Returns a guard only when a file
/// appender is involved; callers must keep it alive for the process.
pub fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    init(verbose, None)
}

/// Initialize console logging plus a daily-rolling log file in `log_dir`.
pub fn init_logging_with_dir(verbose: bool, log_dir: PathBuf) -> Option<WorkerGuard> {
    init(verbose, Some(log_dir))
}

fn init(verbose: bool, log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let default_directive = if verbose {
        "cardpress=debug"
    } else {
        "cardpress=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "cardpress.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let initialized = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()
                .is_ok();
            initialized.then_some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .try_init();
            None
        }
    }
}
