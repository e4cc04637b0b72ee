//! # echo-shared
//!
//! Leaf crate of the ECHO workspace: call-sign handles, chat and message
//! identifiers, the fixed user directory, protocol constants and the
//! wall-clock helper. Everything here is plain data with no I/O.

pub mod constants;
pub mod directory;
pub mod time;
pub mod types;

mod error;

pub use directory::Directory;
pub use error::HandleError;
pub use types::{ChatId, ConnectionId, Handle, MessageId};
