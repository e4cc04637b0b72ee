use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend rejected or could not complete a request.
    #[error("transport error: {0}")]
    Transport(String),

    /// A value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A path was structurally invalid for the requested operation.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The subscription's backing channel is gone; the backend shut down.
    #[error("subscription closed")]
    Closed,
}
