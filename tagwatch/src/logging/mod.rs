//! Logging setup.
//!
//! Console output is always enabled. When a directory is configured, records
//! are also written to a daily-rotated file through a non-blocking writer.
//! Timestamps use the local timezone.

use std::path::Path;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LoggingSettings;
use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "tagwatch=info,kv_store=info,sqlx=warn,reqwest=warn";

/// Filter used by `--verbose`.
pub const VERBOSE_LOG_FILTER: &str = "tagwatch=debug,kv_store=debug,sqlx=warn,reqwest=info";

const LOG_FILE_PREFIX: &str = "tagwatch.log";

/// Formats timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Pick the filter directive: `RUST_LOG`, then the configured filter, then the
/// default for the verbosity.
fn build_filter(settings: &LoggingSettings, verbose: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = match (&settings.filter, verbose) {
        (_, true) => VERBOSE_LOG_FILTER,
        (Some(filter), false) => filter.as_str(),
        (None, false) => DEFAULT_LOG_FILTER,
    };

    EnvFilter::try_new(directive)
        .map_err(|e| Error::config(format!("invalid log filter '{}': {}", directive, e)))
}

/// Install the global subscriber.
///
/// Returns the file writer guard when file logging is enabled; keep it alive
/// for the lifetime of the process or buffered records are lost.
pub fn init_logging(settings: &LoggingSettings, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(settings, verbose)?;

    let (file_layer, guard) = match settings.directory.as_deref() {
        Some(dir) => {
            let dir = Path::new(dir);
            std::fs::create_dir_all(dir)?;

            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::config(format!("failed to set global default subscriber: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("tagwatch=info"));
        assert!(DEFAULT_LOG_FILTER.contains("sqlx=warn"));
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert!(EnvFilter::try_new(VERBOSE_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_configured_filter_is_used() {
        // RUST_LOG takes precedence; only check when unset.
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let settings = LoggingSettings {
            filter: Some("tagwatch=trace".into()),
            directory: None,
        };
        let filter = build_filter(&settings, false).unwrap();
        assert_eq!(filter.to_string(), "tagwatch=trace");
    }

    #[test]
    fn test_local_timer_format() {
        let mut out = String::new();
        LocalTimer.format_time(&mut Writer::new(&mut out)).unwrap();
        // 2024-01-01T00:00:00.000+00:00
        assert_eq!(out.len(), 29);
        assert_eq!(&out[10..11], "T");
    }
}
