//! # Logging Utilities
//!
//! Subscriber setup for trapline binaries, built on `tracing`.
//!
//! The core library only emits events; a binary calls one of the `init_*`
//! functions here once at startup to decide where they go:
//! - Human-readable or JSON lines on stderr (stdout belongs to the debuggee
//!   and to the debugger's own reports)
//! - Optionally a copy in a log file
//! - Filtering by level or by `RUST_LOG` directives
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trapline_utils::init_logging;
//!
//! // Keep the guard alive until exit so buffered file output is flushed
//! let _guard = init_logging().expect("Failed to initialize logging");
//! tracing::info!("Debugger started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Filter directives (e.g. `RUST_LOG=debug`, `RUST_LOG=trapline_core=trace`)
//! - `TRAPLINE_LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
//! - `TRAPLINE_LOG_FILE`: Also write to this file, rotated daily
//!
//! ## Examples
//!
//! ```rust,no_run
//! use trapline_utils::{LogFormat, LogLevel, init_logging_with_level};
//!
//! let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Json)
//!     .expect("Failed to initialize logging");
//! ```

use std::fmt as std_fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::{DateTime, Utc};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Level used when neither an explicit level nor `RUST_LOG` is given
const DEFAULT_LEVEL: Level = Level::WARN;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

impl std_fmt::Display for LogFormat
{
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result
    {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    Info,
    /// Debug level (process lifecycle, breakpoint installation)
    Debug,
    /// Trace level (every memory patch and register refresh)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

impl std_fmt::Display for LogLevel
{
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result
    {
        write!(f, "{}", Level::from(*self))
    }
}

/// Where and how to log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Explicit level; `None` defers to `RUST_LOG`, then to `warn`
    pub level: Option<LogLevel>,
    /// Output format for every sink
    pub format: LogFormat,
    /// Optional log file, rotated daily
    pub file: Option<PathBuf>,
}

impl LoggingConfig
{
    /// Read `TRAPLINE_LOG_FORMAT` and `TRAPLINE_LOG_FILE`.
    ///
    /// ## Errors
    ///
    /// [`LoggingError::InvalidFormat`] if `TRAPLINE_LOG_FORMAT` is set to
    /// something other than `pretty` or `json`.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        let format = match env::var("TRAPLINE_LOG_FORMAT") {
            Ok(value) => value.parse()?,
            Err(_) => LogFormat::default(),
        };
        let file = env::var_os("TRAPLINE_LOG_FILE")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            level: None,
            format,
            file,
        })
    }

    fn filter(&self) -> EnvFilter
    {
        match self.level {
            Some(level) => EnvFilter::new(Level::from(level).to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL.to_string())),
        }
    }
}

/// Keeps the background file writer alive.
///
/// Dropping it flushes pending file output; hold it until the program exits.
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard
{
    _file_writer: Option<WorkerGuard>,
}

/// Initialize logging from the environment
///
/// Reads `RUST_LOG`, `TRAPLINE_LOG_FORMAT` and `TRAPLINE_LOG_FILE`.
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `TRAPLINE_LOG_FORMAT` holds an unknown format
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(&LoggingConfig::from_env()?)
}

/// Initialize logging with an explicit level and format
///
/// `TRAPLINE_LOG_FILE` is still honoured.
///
/// ## Errors
///
/// Returns an error if logging is already initialized.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    let config = LoggingConfig {
        level: Some(level),
        format,
        file: LoggingConfig::from_env().ok().and_then(|config| config.file),
    };
    init_logging_with(&config)
}

/// Initialize logging from a [`LoggingConfig`]
///
/// ## Errors
///
/// Returns an error if logging is already initialized.
pub fn init_logging_with(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError>
{
    let (file_writer, guard) = match &config.file {
        Some(path) => {
            let (directory, file_name) = split_log_path(path);
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let result = match config.format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_writer(io::stderr)
                .with_filter(config.filter());
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_filter(config.filter())
            });
            Registry::default().with(console_layer).with(file_layer).try_init()
        }
        LogFormat::Json => {
            let console_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_writer(io::stderr)
                .with_filter(config.filter());
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_filter(config.filter())
            });
            Registry::default().with(console_layer).with(file_layer).try_init()
        }
    };
    result.map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    Ok(LoggingGuard { _file_writer: guard })
}

/// Name of the log file for a debugging session started at `started`
///
/// Produces `<directory>/YYYY-MM-DD-trapline-<pid>.log`, so concurrent
/// sessions never share a file.
#[must_use]
pub fn session_log_path(directory: &Path, started: DateTime<Utc>, pid: u32) -> PathBuf
{
    directory.join(format!("{}-trapline-{pid}.log", started.format("%Y-%m-%d")))
}

fn split_log_path(path: &Path) -> (PathBuf, PathBuf)
{
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file_name = path
        .file_name()
        .map_or_else(|| PathBuf::from("trapline.log"), PathBuf::from);
    (directory, file_name)
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Unknown log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Unknown log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),
}

#[cfg(test)]
mod tests
{
    use chrono::TimeZone;
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("text").unwrap(), LogFormat::Pretty);
        assert!(matches!(LogFormat::from_str("yaml"), Err(LoggingError::InvalidFormat(value)) if value == "yaml"));
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("Warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(matches!(LogLevel::from_str("loud"), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_display_round_trips_through_from_str()
    {
        for level in [LogLevel::Error, LogLevel::Warn, LogLevel::Info, LogLevel::Debug, LogLevel::Trace] {
            assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
        }
        for format in [LogFormat::Pretty, LogFormat::Json] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_session_log_path()
    {
        let started = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 0).unwrap();
        let path = session_log_path(Path::new("/var/log/trapline"), started, 4242);
        assert_eq!(path, PathBuf::from("/var/log/trapline/2024-03-09-trapline-4242.log"));
    }

    #[test]
    fn test_split_log_path()
    {
        assert_eq!(
            split_log_path(Path::new("/tmp/trapline/debug.log")),
            (PathBuf::from("/tmp/trapline"), PathBuf::from("debug.log"))
        );
        assert_eq!(
            split_log_path(Path::new("debug.log")),
            (PathBuf::from("."), PathBuf::from("debug.log"))
        );
    }

    #[test]
    fn test_explicit_level_overrides_environment()
    {
        let config = LoggingConfig {
            level: Some(LogLevel::Trace),
            ..LoggingConfig::default()
        };
        assert_eq!(config.filter().max_level_hint(), Some(LevelFilter::TRACE));
    }
}
