//! Log output setup.
//!
//! Library code only emits `tracing` events. Frame traffic goes to the
//! `burrow::wire` target and is emitted only while traffic logging is
//! switched on for a session (see [`Session::set_logging`]).
//!
//! [`Session::set_logging`]: crate::Session::set_logging

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{BurrowError, Result};

/// Target used for per-frame traffic events.
pub const WIRE_TARGET: &str = "burrow::wire";

/// `%Y-%m-%d %H:%M:%S` local timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTimer;

impl FormatTime for LogTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Install the global subscriber.
///
/// Honors `RUST_LOG`; otherwise uses `config.level`, defaulting to `info`.
/// Output goes to `config.logfile` (appending) when set, stdout otherwise.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let level = config.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(LogTimer);

    let installed = match &config.logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    BurrowError::Config(format!("Failed to open logfile {}: {e}", path.display()))
                })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        },
        None => builder.try_init(),
    };

    installed.map_err(|e| BurrowError::Config(format!("Failed to install logger: {e}")))
}
