//! One logged-in connection: the facade a presentation shell talks to.
//!
//! A [`Session`] owns the live feeds (chat list, presence, and the open
//! chat's message window), the sidebar projection, and the event channel.
//! It wires the registry, ledger and presence tracker together around one
//! viewer and one connection id, and restores its own subscriptions when
//! the backend drops one.

use std::sync::Arc;

use tracing::{debug, info, warn};

use echo_shared::time::now_millis;
use echo_shared::{ChatId, ConnectionId, Directory, Handle, MessageId};
use echo_store::path::paths;
use echo_store::{PushIdGenerator, StoreBackend, StoreError};

use crate::config::EngineConfig;
use crate::events::{emit, EventReceiver, EventSender, EVENT_CHANNEL_CAPACITY};
use crate::ledger::{MessageFeed, MessageLedger};
use crate::models::{MessageRecord, UserRecord};
use crate::presence::{PresenceFeed, PresenceTracker};
use crate::registry::{ChatListFeed, ChatRegistry};
use crate::sidebar::{SidebarEntry, SidebarProjection};
use crate::unread::UnreadBadges;
use crate::{EngineError, EngineEvent, Result};

pub struct Session<B: StoreBackend> {
    registry: ChatRegistry<B>,
    ledger: MessageLedger<B>,
    presence: PresenceTracker<B>,
    events: EventSender,
    conn: ConnectionId,
    viewer: Handle,
    projection: SidebarProjection,
    chat_feed: ChatListFeed,
    presence_feed: PresenceFeed,
    message_feed: Option<MessageFeed>,
}

impl<B: StoreBackend> Session<B> {
    /// Log in as `handle_raw` (resolved against the directory) under the
    /// given backend account id.
    ///
    /// Writes the registration record if this is the handle's first login,
    /// goes online, and attaches the chat list and presence feeds. Returns
    /// the session plus the receiving end of its event channel.
    pub async fn login(
        store: Arc<B>,
        directory: Arc<Directory>,
        config: EngineConfig,
        handle_raw: &str,
        account_id: &str,
    ) -> Result<(Self, EventReceiver)> {
        let viewer = directory.resolve(handle_raw).ok_or_else(|| {
            EngineError::Validation(format!("unknown call-sign: {handle_raw}"))
        })?;

        let user = UserRecord {
            callsign: viewer.clone(),
            uid: account_id.to_string(),
            created_at: now_millis(),
        };
        let value = serde_json::to_value(&user).map_err(StoreError::from)?;
        let first_login = store.create(&paths::user(&viewer), value).await?;
        if first_login {
            info!(handle = %viewer, "registered new user");
        }

        let ids = Arc::new(PushIdGenerator::new());
        let registry = ChatRegistry::new(Arc::clone(&store), directory, Arc::clone(&ids));
        let ledger = MessageLedger::new(Arc::clone(&store), ids, config.clone());
        let presence = PresenceTracker::new(Arc::clone(&store), config.typing_timeout);

        let conn = ConnectionId::generate();
        if let Err(err) = presence.set_online(conn, &viewer).await {
            // Presence is advisory; messaging still works without it.
            warn!(error = %err, "failed to go online");
        }

        let chat_feed = registry.subscribe_chats(&viewer).await?;
        let presence_feed = presence.subscribe_presence().await?;
        let (events, receiver) = tokio::sync::mpsc::channel(EVENT_CHANNEL_CAPACITY);

        info!(handle = %viewer, conn = %conn, "session started");
        Ok((
            Self {
                registry,
                ledger,
                presence,
                events,
                conn,
                viewer: viewer.clone(),
                projection: SidebarProjection::new(viewer),
                chat_feed,
                presence_feed,
                message_feed: None,
            },
            receiver,
        ))
    }

    pub fn viewer(&self) -> &Handle {
        &self.viewer
    }

    pub fn connection(&self) -> ConnectionId {
        self.conn
    }

    // -----------------------------------------------------------------------
    // Chat lifecycle
    // -----------------------------------------------------------------------

    /// Start (or find) the DM with `other`.
    pub async fn start_dm(&self, other: &Handle) -> Result<ChatId> {
        self.registry.create_direct_chat(&self.viewer, other).await
    }

    /// Create a group with the viewer as creator.
    pub async fn start_group(
        &self,
        name: &str,
        topic: &str,
        members: &[Handle],
    ) -> Result<ChatId> {
        self.registry
            .create_group(&self.viewer, name, topic, members)
            .await
    }

    pub async fn invite(&self, chat: &ChatId, target: &Handle) -> Result<()> {
        self.registry.add_member(&self.viewer, chat, target).await
    }

    pub async fn remove(&self, chat: &ChatId, target: &Handle) -> Result<()> {
        self.registry.remove_member(&self.viewer, chat, target).await
    }

    // -----------------------------------------------------------------------
    // The open chat
    // -----------------------------------------------------------------------

    /// Open a chat: swap the message window to it and mark it read.
    pub async fn open_chat(&mut self, chat: &ChatId) -> Result<()> {
        // Drop the previous window before subscribing, so a failure below
        // never leaves a stale feed attached to the wrong chat.
        self.message_feed = None;
        self.projection.set_active(Some(chat.clone()));

        self.message_feed = Some(self.ledger.subscribe_messages(chat, None).await?);
        self.ledger.mark_read(chat, &self.viewer).await?;
        debug!(chat = %chat, "chat opened");
        Ok(())
    }

    pub fn close_chat(&mut self) {
        self.projection.set_active(None);
        self.message_feed = None;
    }

    pub fn active_chat(&self) -> Option<&ChatId> {
        self.projection.active()
    }

    /// The open chat's current message window, oldest first.
    pub fn messages(&self) -> Vec<MessageRecord> {
        self.message_feed
            .as_ref()
            .map(MessageFeed::current)
            .unwrap_or_default()
    }

    /// Send into the open chat.
    pub async fn send(
        &self,
        text: Option<&str>,
        reply_to: Option<&MessageId>,
        media_url: Option<&str>,
    ) -> Result<MessageId> {
        let chat = self.require_open()?;
        self.ledger
            .send(&chat, &self.viewer, text, reply_to, media_url)
            .await
    }

    pub async fn react(&self, msg: &MessageId, emoji: &str) -> Result<()> {
        let chat = self.require_open()?;
        self.ledger
            .set_reaction(&chat, msg, &self.viewer, emoji)
            .await
    }

    pub async fn delete_message(&self, msg: &MessageId) -> Result<()> {
        let chat = self.require_open()?;
        self.ledger.delete(&chat, msg, &self.viewer).await
    }

    /// Wipe the open chat's history.
    pub async fn clear_chat(&self) -> Result<()> {
        let chat = self.require_open()?;
        self.ledger.clear(&chat).await
    }

    /// Assert the viewer is typing in the open chat. Advisory; failures
    /// are logged and swallowed.
    pub async fn notify_typing(&self) {
        let Some(chat) = self.projection.active().cloned() else {
            return;
        };
        if let Err(err) = self.presence.set_typing(self.conn, &chat).await {
            warn!(error = %err, "failed to publish typing state");
        }
    }

    /// Who else is typing in the open chat right now.
    pub fn typing_peers(&self) -> Vec<Handle> {
        let Some(chat) = self.projection.active() else {
            return Vec::new();
        };
        self.presence_feed.current().typing_in(chat, &self.viewer)
    }

    // -----------------------------------------------------------------------
    // Sidebar
    // -----------------------------------------------------------------------

    /// Project the sidebar from the latest snapshots. Notification
    /// triggers produced by the projection are emitted on the event
    /// channel as [`EngineEvent::NewMessage`].
    pub fn poll_sidebar(&mut self) -> Vec<SidebarEntry> {
        let chats = self.chat_feed.current();
        let presence = self.presence_feed.current();
        let (entries, triggers) = self.projection.project(&chats, &presence);
        for trigger in triggers {
            emit(
                &self.events,
                EngineEvent::NewMessage {
                    chat: trigger.chat,
                    from: trigger.from,
                    text: trigger.text,
                },
            );
        }
        entries
    }

    /// Unread badge totals as of the latest chat list snapshot.
    pub fn badges(&self) -> UnreadBadges {
        UnreadBadges::from_chats(&self.viewer, &self.chat_feed.current())
    }

    /// Block until any attached feed delivers a new snapshot.
    ///
    /// A broken feed is resubscribed in place and a connectivity warning
    /// is emitted; callers just re-poll either way.
    pub async fn wait_for_change(&mut self) -> Result<()> {
        enum Feed {
            Chats,
            Presence,
            Messages,
        }

        let chat_feed = &mut self.chat_feed;
        let presence_feed = &mut self.presence_feed;
        let outcome = match self.message_feed.as_mut() {
            Some(messages) => tokio::select! {
                r = chat_feed.changed() => (Feed::Chats, r),
                r = presence_feed.changed() => (Feed::Presence, r),
                r = messages.changed() => (Feed::Messages, r),
            },
            None => tokio::select! {
                r = chat_feed.changed() => (Feed::Chats, r),
                r = presence_feed.changed() => (Feed::Presence, r),
            },
        };

        match outcome {
            (_, Ok(())) => Ok(()),
            (which, Err(err)) => {
                warn!(error = %err, "live feed dropped; resubscribing");
                match which {
                    Feed::Chats => {
                        self.chat_feed = self.registry.subscribe_chats(&self.viewer).await?;
                    }
                    Feed::Presence => {
                        self.presence_feed = self.presence.subscribe_presence().await?;
                    }
                    Feed::Messages => {
                        if let Some(chat) = self.projection.active().cloned() {
                            self.message_feed =
                                Some(self.ledger.subscribe_messages(&chat, None).await?);
                        }
                    }
                }
                emit(
                    &self.events,
                    EngineEvent::ConnectivityWarning {
                        detail: err.to_string(),
                    },
                );
                Ok(())
            }
        }
    }

    /// End the session: go offline and release the feeds.
    pub async fn logout(self) -> Result<()> {
        self.presence.set_offline(self.conn).await?;
        info!(handle = %self.viewer, conn = %self.conn, "session ended");
        Ok(())
    }

    fn require_open(&self) -> Result<ChatId> {
        self.projection
            .active()
            .cloned()
            .ok_or_else(|| EngineError::Validation("no chat is open".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_store::MemoryStore;
    use serde_json::Value;

    async fn login(
        store: &Arc<MemoryStore>,
        handle: &str,
    ) -> (Session<MemoryStore>, EventReceiver) {
        Session::login(
            Arc::clone(store),
            Arc::new(Directory::with_defaults()),
            EngineConfig::default(),
            handle,
            &format!("uid-{handle}"),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn login_rejects_unknown_callsigns() {
        let store = Arc::new(MemoryStore::new());
        let result = Session::login(
            store,
            Arc::new(Directory::with_defaults()),
            EngineConfig::default(),
            "nobody",
            "uid-x",
        )
        .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn login_registers_once_and_keeps_the_original_record() {
        let store = Arc::new(MemoryStore::new());
        let (ng, _rx) = login(&store, "ng").await;
        let first = store.get(&paths::user(ng.viewer())).await.unwrap();
        ng.logout().await.unwrap();

        let (ng, _rx) = login(&store, "NG").await;
        let second = store.get(&paths::user(ng.viewer())).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn dm_roundtrip_with_unread_and_notification() {
        let store = Arc::new(MemoryStore::new());
        let (mut ng, _ng_rx) = login(&store, "NG").await;
        let (mut vw, mut vw_rx) = login(&store, "VW").await;

        let dm = ng.start_dm(vw.viewer()).await.unwrap();
        ng.open_chat(&dm).await.unwrap();
        ng.send(Some("hello"), None, None).await.unwrap();

        // The recipient sees the chat with one unread and gets an event.
        let entries = vw.poll_sidebar();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].unread, 1);
        assert_eq!(entries[0].title, "NG");
        assert!(entries[0].online);
        assert_eq!(vw.badges().total(), 1);
        match vw_rx.try_recv().unwrap() {
            EngineEvent::NewMessage { chat, from, text } => {
                assert_eq!(chat, dm);
                assert_eq!(from, *ng.viewer());
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Opening the chat marks it read and shows the window.
        vw.open_chat(&dm).await.unwrap();
        let messages = vw.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_read_by(vw.viewer()));
        assert_eq!(vw.badges().total(), 0);

        // The sender sees the receipt through their own window.
        assert!(ng.messages()[0].is_read_by(vw.viewer()));
    }

    #[tokio::test]
    async fn sending_without_an_open_chat_is_a_validation_error() {
        let store = Arc::new(MemoryStore::new());
        let (ng, _rx) = login(&store, "NG").await;
        assert!(matches!(
            ng.send(Some("hi"), None, None).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn typing_is_visible_to_the_other_party_only() {
        let store = Arc::new(MemoryStore::new());
        let (mut ng, _ng_rx) = login(&store, "NG").await;
        let (mut vw, _vw_rx) = login(&store, "VW").await;

        let dm = ng.start_dm(vw.viewer()).await.unwrap();
        ng.open_chat(&dm).await.unwrap();
        vw.open_chat(&dm).await.unwrap();

        ng.notify_typing().await;
        assert_eq!(vw.typing_peers(), vec![ng.viewer().clone()]);
        assert!(ng.typing_peers().is_empty());
    }

    #[tokio::test]
    async fn logout_flips_presence_offline() {
        let store = Arc::new(MemoryStore::new());
        let (ng, _ng_rx) = login(&store, "NG").await;
        let (mut vw, _vw_rx) = login(&store, "VW").await;

        let ng_handle = ng.viewer().clone();
        vw.start_dm(&ng_handle).await.unwrap();
        let entries = vw.poll_sidebar();
        assert!(entries[0].online);

        ng.logout().await.unwrap();
        let entries = vw.poll_sidebar();
        assert!(!entries[0].online);
    }

    #[tokio::test]
    async fn wait_for_change_wakes_on_new_messages() {
        let store = Arc::new(MemoryStore::new());
        let (mut ng, _ng_rx) = login(&store, "NG").await;
        let (mut vw, _vw_rx) = login(&store, "VW").await;

        let dm = ng.start_dm(vw.viewer()).await.unwrap();
        ng.open_chat(&dm).await.unwrap();
        vw.open_chat(&dm).await.unwrap();

        let send = async {
            ng.send(Some("ping"), None, None).await.unwrap();
        };
        let (_, waited) = tokio::join!(send, vw.wait_for_change());
        waited.unwrap();
        assert_eq!(vw.messages().len(), 1);
    }

    #[tokio::test]
    async fn vanished_user_record_field_is_tolerated() {
        // A foreign client may write extra fields; decoding must not break.
        let store = Arc::new(MemoryStore::new());
        let (ng, _rx) = login(&store, "NG").await;
        let path = paths::user(ng.viewer()).child("nickname");
        store.set(&path, Value::String("goose".into())).await.unwrap();
        let raw = store.get(&paths::user(ng.viewer())).await.unwrap();
        let decoded: UserRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(decoded.callsign, *ng.viewer());
    }
}
