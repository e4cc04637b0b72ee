//! Events the engine emits toward the presentation boundary.
//!
//! Delivery of the actual toast / OS notification is external; the engine
//! only decides that one should fire.

use tokio::sync::mpsc;

use echo_shared::{ChatId, Handle};

/// Capacity of the engine event channel handed out at login.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A new message arrived in a chat the user is not currently looking
    /// at. Gated by the sidebar projection's high-water mark, not by the
    /// unread counter.
    NewMessage {
        chat: ChatId,
        from: Handle,
        text: String,
    },

    /// A live subscription broke; the engine has already resubscribed.
    /// Presentation should surface a non-fatal connectivity warning.
    ConnectivityWarning { detail: String },
}

pub type EventSender = mpsc::Sender<EngineEvent>;
pub type EventReceiver = mpsc::Receiver<EngineEvent>;

/// Best-effort emission: a slow or vanished consumer must never stall the
/// engine, so a full channel drops the event with a warning.
pub(crate) fn emit(tx: &EventSender, event: EngineEvent) {
    if let Err(err) = tx.try_send(event) {
        tracing::warn!(error = %err, "dropping engine event");
    }
}
