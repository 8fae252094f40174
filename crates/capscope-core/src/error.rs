//! # Error Types
//!
//! General error handling for capability inspection.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for inspection operations
///
/// This enum represents all the ways building the address-space model or
/// walking the capability graph can fail. Malformed capabilities met during a
/// walk are never errors: they end exploration of that one value and nothing
/// more.
///
/// ## Error Categories
///
/// 1. **Provider errors**: MappingProvider (fatal), SymbolProvider (local to one image)
/// 2. **Resource errors**: ResourceExhausted (visited ranges, mappings, images)
/// 3. **Input errors**: Parse, InvalidArgument
/// 4. **I/O errors**: Io (for file and subprocess operations)
#[derive(Error, Debug)]
pub enum CapscopeError
{
    /// The mapping list of the inspected process could not be obtained
    ///
    /// Without a mapping list no address can be named, so callers treat this
    /// as fatal. Typical causes:
    /// - `procstat` is not installed or exited with an error
    /// - `/proc/<pid>/maps` does not exist or is not readable
    /// - The provider produced no parseable records at all
    #[error("Unable to load mappings: {0}")]
    MappingProvider(String),

    /// The symbol dump for one image could not be obtained
    ///
    /// The address-space model catches this, logs it and carries on with no
    /// symbols for that image; it is only surfaced when a provider is called
    /// directly.
    #[error("Unable to load symbols for {}: {details}", path.display())]
    SymbolProvider
    {
        /// Image whose symbols were requested
        path: PathBuf,
        /// What went wrong
        details: String,
    },

    /// A bounded table outgrew its configured limit
    ///
    /// This occurs when:
    /// - The visited range set holds more entries than `max_ranges`
    /// - A mapping reload yields more records than `max_mappings`
    /// - More distinct images are loaded than `max_images`
    ///
    /// Inspection is a bounded one-shot diagnostic, so the host reports this
    /// and exits rather than trying to recover.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A provider line could not be parsed
    #[error("Parse error on line {line}: {details}")]
    Parse
    {
        /// 1-based line number within the provider output
        line: usize,
        /// Description of what was expected
        details: String,
    },

    /// Invalid argument passed to an inspection function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (for file operations and spawning providers)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, CapscopeError>`
///
/// ```rust
/// use capscope_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, CapscopeError>;
