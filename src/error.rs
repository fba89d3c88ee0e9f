//! Error handling for the signal data path
//!
//! Construction-time failures (descriptor builder, port connect, reader
//! construction) are returned as [`DataPathError`]. Failures that happen while
//! streaming are reported through [`crate::reader::ReadStatus`] instead.

use thiserror::Error;

/// Main error type for data path operations
#[derive(Error, Debug)]
pub enum DataPathError {
    /// The descriptor builder rejected its input
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Value and domain packets do not belong together
    #[error("Domain mismatch: {0}")]
    DomainMismatch(String),

    /// The input port is already bound to a signal
    #[error("Input port is already connected")]
    AlreadyConnected,

    /// The input port is not bound to a signal
    #[error("Input port is not connected")]
    NotConnected,

    /// The input port refused the signal
    #[error("Signal rejected: {0}")]
    Rejected(String),

    /// A data packet was sent through an inactive signal
    #[error("Signal {0} is inactive")]
    Inactive(String),

    /// A connection dropped samples because it reached its high-water mark
    #[error("Connection overflow: {dropped} samples dropped")]
    Overflow { dropped: u64 },

    /// No conversion exists for the current descriptor
    #[error("Unknown descriptor: {0}")]
    UnknownDescriptor(String),

    /// A packet violated a size or layout invariant
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Domain descriptor has no origin, so ticks cannot become timestamps
    #[error("Domain has no absolute time reference")]
    NoAbsoluteTime,

    /// Multi reader targets do not share an absolute timeline
    #[error("Signals are not synchronized: {0}")]
    NotSynchronized(String),

    /// Registry lookup failed
    #[error("Signal not found: {0}")]
    NotFound(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DataPathError>,
    },
}

impl DataPathError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DataPathError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &DataPathError {
        match self {
            DataPathError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for data path operations
pub type Result<T> = std::result::Result<T, DataPathError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
