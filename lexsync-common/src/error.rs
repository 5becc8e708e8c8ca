//! Common error types for LexSync

use thiserror::Error;

/// Common result type for LexSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across the LexSync services
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed payload or rejected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested resource not found (migration record, archive object, backup)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object archive unreachable or refused the operation
    #[error("Archive unavailable: {0}")]
    ArchiveUnavailable(String),

    /// Pre-write backup could not be produced
    #[error("Backup error: {0}")]
    Backup(String),

    /// Relational store error (wraps sqlx::Error)
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Concurrent mutation conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error (wraps serde_json::Error)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}
