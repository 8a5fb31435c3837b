//! Error types for the storage layer.
//!
//! Command outcomes are reported as [`Status`](crate::storage::Status) values.
//! The types here cover what sits underneath: engine failures and the
//! failures that can happen while opening storage.

use thiserror::Error;

/// Result type returned by [`Engine`](crate::storage::Engine) calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failures reported by an engine implementation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// I/O errors from the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The key holds a different data type than the operation expects.
    #[error("operation against a key holding the wrong kind of value")]
    WrongType,

    /// The engine has already been finalized.
    #[error("engine is closed")]
    Closed,
}

/// Failures while opening or configuring storage.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O errors while preparing the data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The engine refused to open.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}
