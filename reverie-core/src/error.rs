//! Error types for the Reverie core library.

use thiserror::Error;

/// Top-level error type for all Reverie memory operations.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The backing vector store could not be reached or opened.
    #[error("Backing store unreachable: {0}")]
    Connection(String),

    /// A nearest-neighbor query against the backing store failed.
    ///
    /// Tool-facing callers degrade this to "no results" but log it
    /// distinctly from a genuinely empty store.
    #[error("Vector search failed: {0}")]
    Search(String),

    /// The embedding provider was unreachable or returned a malformed
    /// response.
    #[error("Embedding provider error: {0}")]
    Embedding(String),

    /// An entry's embedding length did not match the collection's fixed
    /// dimensionality.  Non-fatal under the default policy: the entry is
    /// discarded with a logged warning.
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimensionality fixed by the collection's first entry.
        expected: usize,
        /// Dimensionality of the rejected entry.
        got: usize,
    },

    /// Configuration error (bad TOML, invalid collection name, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite failure below the open/search boundary.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, MemoryError>;
