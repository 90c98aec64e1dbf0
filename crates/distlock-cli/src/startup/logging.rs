//! Logging setup for the `distlock` binary.
//!
//! Console output goes to stderr so the wrapped command keeps stdout to
//! itself. A daily-rolling `distlock.log` file is added when a log directory
//! is configured.
//!
//! | Variable              | Effect                                   |
//! |-----------------------|------------------------------------------|
//! | `DISTLOCK_LOG_LEVEL`  | Console and file level (default `warn`)  |
//! | `DISTLOCK_LOG_DIR`    | Enables file logging in this directory   |
//! | `DISTLOCK_LOG_FILE_LEVEL` | File level (default: console level)  |
//! | `RUST_LOG`            | Full filter directives, wins over levels |

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Log file name inside the log directory
pub const LOG_FILE_NAME: &str = "distlock.log";

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log directory; file logging is off when unset
    pub log_dir: Option<PathBuf>,
    /// Console log level
    pub console_level: Level,
    /// File log level
    pub file_level: Level,
    /// Log rotation policy
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            console_level: Level::WARN,
            file_level: Level::WARN,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_dir = lookup("DISTLOCK_LOG_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        let console_level = lookup("DISTLOCK_LOG_LEVEL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::WARN);

        let file_level = lookup("DISTLOCK_LOG_FILE_LEVEL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(console_level);

        Self {
            log_dir,
            console_level,
            file_level,
            rotation: LogRotation::Daily,
        }
    }
}

/// Keeps the non-blocking file writer alive; buffered output is flushed on drop.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG`, when set, replaces the configured level on every layer.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut file_guard = None;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
    layers.push(Box::new(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(console_filter),
    ));

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let appender = RollingFileAppender::new(config.rotation.into(), log_dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        layers.push(Box::new(
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_filter(file_filter),
        ));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    if let Some(log_dir) = &config.log_dir {
        tracing::debug!(log_dir = %log_dir.display(), file = LOG_FILE_NAME, "File logging initialized");
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::from_lookup(lookup(&[]));
        assert_eq!(config.log_dir, None);
        assert_eq!(config.console_level, Level::WARN);
        assert_eq!(config.file_level, Level::WARN);
        assert_eq!(config.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_logging_config_from_env() {
        let config = LoggingConfig::from_lookup(lookup(&[
            ("DISTLOCK_LOG_DIR", "/tmp/distlock-logs"),
            ("DISTLOCK_LOG_LEVEL", "debug"),
        ]));
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/distlock-logs")));
        assert_eq!(config.console_level, Level::DEBUG);
        assert_eq!(config.file_level, Level::DEBUG);

        let config = LoggingConfig::from_lookup(lookup(&[
            ("DISTLOCK_LOG_LEVEL", "info"),
            ("DISTLOCK_LOG_FILE_LEVEL", "trace"),
            ("DISTLOCK_LOG_DIR", "  "),
        ]));
        assert_eq!(config.log_dir, None);
        assert_eq!(config.console_level, Level::INFO);
        assert_eq!(config.file_level, Level::TRACE);
    }

    #[test]
    fn test_invalid_level_falls_back() {
        let config = LoggingConfig::from_lookup(lookup(&[("DISTLOCK_LOG_LEVEL", "loud")]));
        assert_eq!(config.console_level, Level::WARN);
    }

    #[test]
    fn test_log_rotation_conversion() {
        assert_eq!(Rotation::from(LogRotation::Daily), Rotation::DAILY);
        assert_eq!(Rotation::from(LogRotation::Hourly), Rotation::HOURLY);
        assert_eq!(Rotation::from(LogRotation::Never), Rotation::NEVER);
    }
}
