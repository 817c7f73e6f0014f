//! Error types for the blob store.

/// Errors that can occur when working with the blob store.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    /// Backend storage error
    #[error("object storage error: {0}")]
    Backend(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No blob stored under this address
    #[error("no blob stored at {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, ObjectStoreError>;
