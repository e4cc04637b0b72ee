use thiserror::Error;

use echo_store::StoreError;

/// Errors surfaced by engine operations.
///
/// Validation and authorization failures come back synchronously from the
/// mutating call and are meant to reach the user; transport failures wrap
/// the store error that caused them.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A required field was missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requester is not allowed to perform the operation.
    #[error("not allowed: {0}")]
    Authorization(String),

    /// The chat or message no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend rejected or could not complete the request.
    #[error(transparent)]
    Store(#[from] StoreError),
}
