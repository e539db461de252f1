//! Error types for the folio persistence layer
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Recoverable failures (I/O, validation, corrupt files) are returned as
//! `FolioResult`. Precondition violations such as touching a discarded context
//! or a deleted instance are programming errors and panic at the call site
//! instead of surfacing here.

use crate::schema::ValidationReport;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for folio operations
pub type FolioResult<T> = std::result::Result<T, FolioError>;

/// Error types for the folio persistence layer
#[derive(Debug, Error)]
pub enum FolioError {
    /// I/O error (store file, lock file, cache file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Store file or cache file failed its integrity check
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Store configuration is missing or malformed
    #[error("Config error: {0}")]
    Config(String),

    /// Entity kind is not part of the model
    #[error("Unknown entity kind: {0}")]
    UnknownEntity(String),

    /// Save-time schema validation failed
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    /// Storage layer error
    #[error("Store error: {0}")]
    Store(String),

    /// Another process holds the store directory lock
    #[error("Store locked: {}", .0.display())]
    Locked(PathBuf),

    /// A change batch could not be applied to the view consistently
    #[error("View desync: {0}")]
    Desync(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<bincode::Error> for FolioError {
    fn from(e: bincode::Error) -> Self {
        FolioError::Serialization(e.to_string())
    }
}
