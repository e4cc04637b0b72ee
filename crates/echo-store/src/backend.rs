//! The backend seam.
//!
//! [`StoreBackend`] abstracts the shared real-time data store. The engine
//! is generic over it, so tests run against [`crate::MemoryStore`] and a
//! deployment can plug in a remote transport without touching the engine.
//!
//! Subscriptions are snapshot-replace streams: every commit that touches
//! the watched path re-delivers the full current view, never a diff.
//! Updates to the same entity arrive in commit order; intermediate
//! snapshots may coalesce if the consumer polls slowly, which is sound
//! because each snapshot is complete.

use std::future::Future;

use serde_json::Value;
use tokio::sync::watch;

use echo_shared::ConnectionId;

use crate::error::StoreError;
use crate::path::StorePath;
use crate::Result;

/// Operations the engine requires from the shared backend.
///
/// Write methods reject with [`StoreError::Transport`] when the backend is
/// unreachable or denies the request; the engine never retries on its own.
pub trait StoreBackend: Send + Sync + 'static {
    /// Point read. Absent paths read as `Value::Null`.
    fn get(&self, path: &StorePath) -> impl Future<Output = Result<Value>> + Send;

    /// Point write. Writing `Value::Null` deletes the subtree.
    fn set(&self, path: &StorePath, value: Value) -> impl Future<Output = Result<()>> + Send;

    /// Multi-path write applied as a single atomic commit. This is what
    /// makes send-message-plus-unread-increment transactional.
    fn update(&self, updates: Vec<(StorePath, Value)>)
        -> impl Future<Output = Result<()>> + Send;

    /// Write `value` only if the path is currently absent. Returns whether
    /// the write happened. Compare-and-set primitive behind idempotent DM
    /// creation.
    fn create(&self, path: &StorePath, value: Value)
        -> impl Future<Output = Result<bool>> + Send;

    /// The last `limit` children of `path`, ordered ascending by the
    /// numeric child field `order_child`, ties broken by child key.
    fn query_last(
        &self,
        path: &StorePath,
        order_child: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<(String, Value)>>> + Send;

    /// Live subtree snapshots at `path`.
    fn subscribe(&self, path: &StorePath) -> impl Future<Output = Result<Subscription>> + Send;

    /// Live ordered-window snapshots: the view of [`Self::query_last`],
    /// re-delivered (as a `Value::Array` of child values) on every commit
    /// inside the window.
    fn subscribe_query(
        &self,
        path: &StorePath,
        order_child: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Subscription>> + Send;

    /// Register cleanup writes applied when `conn` goes away, gracefully
    /// or not. Re-registering replaces the previous set for that
    /// connection.
    fn on_disconnect_update(
        &self,
        conn: ConnectionId,
        updates: Vec<(StorePath, Value)>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Tear down a connection: apply and clear its registered cleanup
    /// writes.
    fn disconnect(&self, conn: ConnectionId) -> impl Future<Output = Result<()>> + Send;
}

/// A live view of one path, fed by the backend on every relevant commit.
///
/// Dropping the subscription detaches it; the backend prunes closed
/// watchers. Detaching is how the engine cancels a stale chat window
/// before attaching the next one.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<Value>,
}

impl Subscription {
    pub(crate) fn new(rx: watch::Receiver<Value>) -> Self {
        Self { rx }
    }

    /// Clone of the latest delivered snapshot.
    pub fn current(&self) -> Value {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot after the last one observed.
    ///
    /// Returns [`StoreError::Closed`] when the backend has shut down the
    /// stream; callers surface that as a connectivity warning and
    /// resubscribe rather than going silent.
    pub async fn changed(&mut self) -> Result<()> {
        self.rx.changed().await.map_err(|_| StoreError::Closed)
    }
}
