//! # echo-store
//!
//! The store adapter: everything the engine needs from the shared
//! real-time backend, behind one trait. Point reads and writes, atomic
//! multi-path updates, write-if-absent creation, ordered range queries,
//! live snapshot-replace subscriptions and disconnect-triggered cleanup.
//!
//! [`MemoryStore`] is the in-process backend implementation. It models the
//! deployed backend's semantics exactly: writes to the same path are
//! serialized, a multi-path update commits atomically, writing `null`
//! deletes, and every subscriber observes commits in the order they were
//! applied.

pub mod backend;
pub mod memory;
pub mod path;
pub mod push_id;

mod error;

pub use backend::{StoreBackend, Subscription};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use path::StorePath;
pub use push_id::PushIdGenerator;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
