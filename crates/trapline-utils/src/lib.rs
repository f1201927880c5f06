//! # trapline Utilities
//!
//! Shared helpers for the trapline binaries.
//!
//! Currently this is logging setup: the core library emits `tracing` events
//! and leaves subscriber installation to whichever binary embeds it.

pub mod logging;

pub use logging::{
    init_logging, init_logging_with, init_logging_with_level, session_log_path, LogFormat, LogLevel, LoggingConfig,
    LoggingError, LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
