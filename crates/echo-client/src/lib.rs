//! # echo-client
//!
//! The ECHO chat engine: everything between the store adapter and a thin
//! presentation shell. It owns chat lifecycle and membership, the per-chat
//! message ledger (reactions, replies, read receipts, soft delete), unread
//! accounting, online/typing presence, and the sidebar projection that
//! decides when a notification should fire.
//!
//! The engine holds no authority of its own: every mutation is a request
//! to the shared backend behind [`echo_store::StoreBackend`], and all
//! derived state is recomputed from the live snapshots the backend pushes.

pub mod config;
pub mod events;
pub mod ledger;
pub mod models;
pub mod presence;
pub mod registry;
pub mod session;
pub mod sidebar;
pub mod unread;

mod error;

pub use config::EngineConfig;
pub use error::EngineError;
pub use events::EngineEvent;
pub use session::Session;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Install the default tracing subscriber for an embedding binary.
///
/// Honors `RUST_LOG`; falls back to a filter that keeps the engine chatty
/// and everything else quiet.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("echo_client=debug,echo_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
