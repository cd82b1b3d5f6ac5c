//! Tracing setup for programs built on the client.
//!
//! The client itself only emits `tracing` events. These helpers install a
//! subscriber for binaries and tests. `RUST_LOG` always wins over the filter
//! configured here.

use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    prelude::*,
    EnvFilter,
};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "wamp_client=info,wamp_transport=info,warn";

const TEST_FILTER: &str = "wamp_client=trace,wamp_transport=debug";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Where and how log events are written.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub filter: String,
    pub format: LogFormat,
    /// Directory of the daily rolling log files. Console only when unset.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Text,
            directory: None,
            file_prefix: "wamp-client".to_string(),
        }
    }
}

impl LogSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Also write to `<dir>/<prefix>.<date>`, rotated daily.
    pub fn directory(mut self, dir: impl AsRef<Path>, prefix: impl Into<String>) -> Self {
        self.directory = Some(dir.as_ref().to_path_buf());
        self.file_prefix = prefix.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.filter))
    }
}

/// Install the global subscriber: console output on stderr, plus a rolling
/// file when a directory is configured. Fails if a subscriber is already set.
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    let console = match settings.format {
        LogFormat::Text => fmt::layer()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let file = match &settings.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(&settings.file_prefix)
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // Flushes on drop, so it lives as long as the process.
            std::mem::forget(guard);
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(settings.env_filter())
        .with(console)
        .with(file)
        .try_init()?;

    tracing::debug!(format = ?settings.format, directory = ?settings.directory, "logging initialized");
    Ok(())
}

/// Route client traces into the test harness output. Safe to call from
/// every test; only the first call installs anything.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(TEST_FILTER)),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_builder() {
        let settings = LogSettings::new()
            .filter("wamp_client=trace")
            .format(LogFormat::Json)
            .directory("/var/log/wamp", "callee");

        assert_eq!(settings.filter, "wamp_client=trace");
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.directory, Some(PathBuf::from("/var/log/wamp")));
        assert_eq!(settings.file_prefix, "callee");

        let defaults = LogSettings::default();
        assert_eq!(defaults.filter, DEFAULT_FILTER);
        assert!(defaults.directory.is_none());
    }

    #[test]
    fn test_init_logging_creates_directory_and_installs_once() {
        let dir = std::env::temp_dir().join(format!("wamp-client-logs-{}", std::process::id()));
        let settings = LogSettings::new().directory(&dir, "unit");

        init_logging(&settings).unwrap();
        assert!(dir.is_dir());
        assert!(init_logging(&settings).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
