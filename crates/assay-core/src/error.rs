//! Error types for Assay Core
//!
//! This module defines all error types used throughout the Assay scoring engine.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.

use thiserror::Error;

/// Result type alias for Assay operations
pub type Result<T> = std::result::Result<T, AssayError>;

/// Main error type for Assay operations
#[derive(Error, Debug)]
pub enum AssayError {
    /// Configuration errors (malformed weights, thresholds, TOML)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An evaluator failed while scoring a dimension
    #[error("Evaluator error in dimension '{dimension}': {message}")]
    Evaluator {
        /// Dimension whose evaluator failed
        dimension: String,
        /// What went wrong
        message: String,
    },

    /// The externally supplied improver function failed
    #[error("Improver error: {0}")]
    Improver(#[source] anyhow::Error),

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        /// Human-readable context for the wrapped error
        context: String,
        /// The underlying error
        source: Box<AssayError>,
    },
}

impl AssayError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}
