//! Online/offline and typing state, per connection.
//!
//! Liveness comes from the backend's disconnect hooks, never from polling:
//! going online registers the offline flip up front, and the backend
//! applies it even on an ungraceful teardown. Typing is a transient
//! sub-state cleared by a single debounced timer per connection, re-armed
//! on every assertion, so the marker is never staler than the timeout.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use echo_shared::time::now_millis;
use echo_shared::{ChatId, ConnectionId, Handle};
use echo_store::path::paths;
use echo_store::{StoreBackend, StoreError, Subscription};

use crate::models::{ChatRecord, PresenceRecord};
use crate::Result;

pub struct PresenceTracker<B> {
    store: Arc<B>,
    typing_timeout: Duration,
    timers: Mutex<HashMap<ConnectionId, JoinHandle<()>>>,
}

impl<B: StoreBackend> PresenceTracker<B> {
    pub fn new(store: Arc<B>, typing_timeout: Duration) -> Self {
        Self {
            store,
            typing_timeout,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Mark this connection online and register the offline flip the
    /// backend will apply when the connection drops.
    pub async fn set_online(&self, conn: ConnectionId, handle: &Handle) -> Result<()> {
        let record = PresenceRecord {
            online: true,
            callsign: handle.clone(),
            last_seen: now_millis(),
            typing: None,
        };
        let value = serde_json::to_value(&record).map_err(StoreError::from)?;
        self.store.set(&paths::presence_of(conn), value).await?;

        self.store
            .on_disconnect_update(
                conn,
                vec![
                    (paths::presence_of(conn).child("online"), Value::Bool(false)),
                    (
                        paths::presence_of(conn).child("lastSeen"),
                        json!(now_millis()),
                    ),
                    (paths::presence_of(conn).child("typing"), Value::Null),
                ],
            )
            .await?;

        info!(conn = %conn, handle = %handle, "presence online");
        Ok(())
    }

    /// Assert "typing in `chat`" for this connection and (re)arm the
    /// debounced clear timer. Continuous typing keeps re-arming the same
    /// timer; the marker clears one timeout after the last assertion.
    pub async fn set_typing(&self, conn: ConnectionId, chat: &ChatId) -> Result<()> {
        self.store
            .update(vec![(
                paths::presence_of(conn).child("typing"),
                json!(chat.as_str()),
            )])
            .await?;

        let store = Arc::clone(&self.store);
        let timeout = self.typing_timeout;
        let clear = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let path = paths::presence_of(conn).child("typing");
            if let Err(err) = store.update(vec![(path, Value::Null)]).await {
                warn!(conn = %conn, error = %err, "failed to clear typing marker");
            }
        });

        let mut timers = self
            .timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = timers.insert(conn, clear) {
            previous.abort();
        }
        Ok(())
    }

    /// Graceful teardown: cancel the typing timer and apply the
    /// registered disconnect writes now.
    pub async fn set_offline(&self, conn: ConnectionId) -> Result<()> {
        let timer = {
            let mut timers = self
                .timers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            timers.remove(&conn)
        };
        if let Some(timer) = timer {
            timer.abort();
        }

        self.store.disconnect(conn).await?;
        debug!(conn = %conn, "presence offline");
        Ok(())
    }

    /// Live snapshot of every connection's presence record. Scoping to a
    /// chat happens client-side via [`PresenceSnapshot`] filters.
    pub async fn subscribe_presence(&self) -> Result<PresenceFeed> {
        let sub = self.store.subscribe(&paths::presence()).await?;
        Ok(PresenceFeed { sub })
    }
}

/// Live map of connection id to presence record.
pub struct PresenceFeed {
    sub: Subscription,
}

impl PresenceFeed {
    pub fn current(&self) -> PresenceSnapshot {
        let snapshot = self.sub.current();
        let records = snapshot
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(conn, raw)| match serde_json::from_value(raw.clone()) {
                        Ok(record) => Some((conn.clone(), record)),
                        Err(err) => {
                            warn!(conn = %conn, error = %err, "skipping undecodable presence record");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        PresenceSnapshot { records }
    }

    pub async fn changed(&mut self) -> echo_store::Result<()> {
        self.sub.changed().await
    }
}

/// Point-in-time presence view with the filters the UI needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceSnapshot {
    records: BTreeMap<String, PresenceRecord>,
}

impl PresenceSnapshot {
    pub fn records(&self) -> impl Iterator<Item = &PresenceRecord> {
        self.records.values()
    }

    /// Whether any connection owned by `handle` is online.
    pub fn is_online(&self, handle: &Handle) -> bool {
        self.records()
            .any(|r| r.online && r.callsign == *handle)
    }

    /// Handles (other than the viewer) currently typing in `chat`, online
    /// connections only, deduplicated.
    pub fn typing_in(&self, chat: &ChatId, viewer: &Handle) -> Vec<Handle> {
        let set: BTreeSet<Handle> = self
            .records()
            .filter(|r| r.online && r.callsign != *viewer && r.typing.as_ref() == Some(chat))
            .map(|r| r.callsign.clone())
            .collect();
        set.into_iter().collect()
    }

    /// Whether any member of `chat` other than the viewer is online.
    pub fn any_other_member_online(&self, chat: &ChatRecord, viewer: &Handle) -> bool {
        chat.member_handles()
            .filter(|m| *m != viewer)
            .any(|m| self.is_online(m))
    }
}
