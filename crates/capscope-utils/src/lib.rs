//! # capscope Utilities
//!
//! Logging setup shared by capscope binaries.
//!
//! Library crates only emit `tracing` events; this crate decides where they
//! go: stderr in pretty or JSON form, plus an optional log file.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_logging, init_logging_to_file, init_logging_with_level, LogFormat, LogLevel, LoggingError,
    LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
