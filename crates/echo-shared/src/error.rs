use thiserror::Error;

/// Errors produced when parsing a call-sign handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    #[error("handle is empty")]
    Empty,

    #[error("handle is too long: {0} characters (max {max})", max = crate::constants::MAX_HANDLE_LEN)]
    TooLong(usize),

    #[error("handle contains invalid character: {0:?}")]
    InvalidChar(char),
}
