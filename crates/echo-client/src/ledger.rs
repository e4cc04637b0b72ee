//! The per-chat message ledger: sending, the live message window, read
//! receipts, reaction toggles, soft delete and bulk clear.
//!
//! Unread counters are maintained here and only here: `send` increments
//! them for every member but the sender, `mark_read` resets the reader's,
//! and nothing ever recomputes them by scanning history. Every code path
//! that creates a message must go through [`MessageLedger::send`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use echo_shared::constants::{MEDIA_SUMMARY_TEXT, TOMBSTONE_TEXT};
use echo_shared::time::now_millis;
use echo_shared::{ChatId, Handle, MessageId};
use echo_store::path::paths;
use echo_store::{PushIdGenerator, StoreBackend, StoreError, StorePath, Subscription};

use crate::config::EngineConfig;
use crate::models::{ChatRecord, MessageRecord};
use crate::unread::UnreadFeed;
use crate::{EngineError, Result};

pub struct MessageLedger<B> {
    store: Arc<B>,
    ids: Arc<PushIdGenerator>,
    config: EngineConfig,
}

impl<B: StoreBackend> MessageLedger<B> {
    pub fn new(store: Arc<B>, ids: Arc<PushIdGenerator>, config: EngineConfig) -> Self {
        Self { store, ids, config }
    }

    /// Append a message.
    ///
    /// One atomic multi-path commit writes the message (sender pre-marked
    /// in its own read-by set), the chat's summary fields, and a +1 unread
    /// increment for every other member.
    pub async fn send(
        &self,
        chat_id: &ChatId,
        sender: &Handle,
        text: Option<&str>,
        reply_to: Option<&MessageId>,
        media_url: Option<&str>,
    ) -> Result<MessageId> {
        let text = text.map(str::trim).unwrap_or("");
        let media_url = media_url.map(str::trim).filter(|m| !m.is_empty());
        if text.is_empty() && media_url.is_none() {
            return Err(EngineError::Validation(
                "a message needs text or media".into(),
            ));
        }

        let chat = self.fetch_chat(chat_id).await?;
        if !chat.is_member(sender) {
            return Err(EngineError::Authorization(format!(
                "{sender} is not a member of this chat"
            )));
        }

        let msg_id = MessageId::new(self.ids.generate());
        let timestamp = now_millis();
        let message = MessageRecord {
            id: msg_id.clone(),
            from: sender.clone(),
            text: text.to_string(),
            media_url: media_url.map(str::to_string),
            reply_to: reply_to.cloned(),
            reactions: BTreeMap::new(),
            read_by: BTreeMap::from([(sender.clone(), true)]),
            timestamp,
            deleted: false,
        };

        let summary = if text.is_empty() {
            MEDIA_SUMMARY_TEXT
        } else {
            text
        };
        let mut updates = vec![
            (paths::message(chat_id, &msg_id), encode(&message)?),
            (paths::chat_last_message(chat_id), json!(summary)),
            (
                paths::chat_last_message_from(chat_id),
                json!(sender.as_str()),
            ),
            (paths::chat_last_message_time(chat_id), json!(timestamp)),
        ];
        for member in chat.member_handles().filter(|m| *m != sender) {
            let unread = chat.unread_for(member) + 1;
            updates.push((paths::chat_unread(chat_id, member), json!(unread)));
        }

        self.store.update(updates).await?;
        info!(chat = %chat_id, msg = %msg_id, from = %sender, "message sent");
        Ok(msg_id)
    }

    /// Live, ascending-by-timestamp window of the most recent messages.
    /// Every change inside the window re-delivers the whole window.
    pub async fn subscribe_messages(
        &self,
        chat_id: &ChatId,
        limit: Option<usize>,
    ) -> Result<MessageFeed> {
        let limit = limit.unwrap_or(self.config.message_window);
        let sub = self
            .store
            .subscribe_query(&paths::messages(chat_id), "timestamp", limit)
            .await?;
        Ok(MessageFeed { sub })
    }

    /// Mark the chat read for `member`: stamp the read-by set of the most
    /// recent messages (bounded window; older messages stay unmarked) and
    /// zero the member's unread counter, in one commit.
    pub async fn mark_read(&self, chat_id: &ChatId, member: &Handle) -> Result<()> {
        self.fetch_chat(chat_id).await?;

        let rows = self
            .store
            .query_last(
                &paths::messages(chat_id),
                "timestamp",
                self.config.mark_read_window,
            )
            .await?;

        let mut updates: Vec<(StorePath, Value)> = rows
            .iter()
            .filter(|(_, raw)| {
                raw.get("readBy")
                    .and_then(|r| r.get(member.as_str()))
                    .and_then(Value::as_bool)
                    != Some(true)
            })
            .map(|(key, _)| {
                (
                    paths::message_read_by(chat_id, &MessageId::new(key.clone()), member),
                    Value::Bool(true),
                )
            })
            .collect();
        updates.push((paths::chat_unread(chat_id, member), json!(0)));

        debug!(chat = %chat_id, member = %member, stamped = updates.len() - 1, "marked read");
        self.store.update(updates).await?;
        Ok(())
    }

    /// Toggle `member`'s reaction with `emoji` on a message. A member may
    /// hold several different emoji on the same message at once.
    pub async fn set_reaction(
        &self,
        chat_id: &ChatId,
        msg_id: &MessageId,
        member: &Handle,
        emoji: &str,
    ) -> Result<()> {
        let message = self.store.get(&paths::message(chat_id, msg_id)).await?;
        if message.is_null() {
            return Err(EngineError::NotFound(format!("message {msg_id}")));
        }

        let path = paths::message_reaction(chat_id, msg_id, emoji, member);
        let present = !self.store.get(&path).await?.is_null();
        let next = if present {
            Value::Null
        } else {
            Value::Bool(true)
        };
        self.store.set(&path, next).await?;
        debug!(chat = %chat_id, msg = %msg_id, member = %member, emoji, on = !present, "reaction toggled");
        Ok(())
    }

    /// Soft-delete a message. Only the original sender's request does
    /// anything; for them it replaces the text with the tombstone, clears
    /// the media reference and sets the deleted flag. Reactions and the
    /// read-by set are retained. Repeating the delete is a no-op.
    pub async fn delete(
        &self,
        chat_id: &ChatId,
        msg_id: &MessageId,
        requester: &Handle,
    ) -> Result<()> {
        let raw = self.store.get(&paths::message(chat_id, msg_id)).await?;
        if raw.is_null() {
            return Err(EngineError::NotFound(format!("message {msg_id}")));
        }
        let message: MessageRecord = serde_json::from_value(raw).map_err(StoreError::from)?;

        if message.from != *requester {
            debug!(chat = %chat_id, msg = %msg_id, requester = %requester, "ignoring delete by non-sender");
            return Ok(());
        }
        if message.deleted {
            return Ok(());
        }

        let base = paths::message(chat_id, msg_id);
        self.store
            .update(vec![
                (base.clone().child("text"), json!(TOMBSTONE_TEXT)),
                (base.clone().child("deleted"), Value::Bool(true)),
                (base.child("mediaUrl"), Value::Null),
            ])
            .await?;
        info!(chat = %chat_id, msg = %msg_id, "message deleted");
        Ok(())
    }

    /// Remove every message in a chat. Chat metadata is untouched. This is
    /// destructive and non-undoable; the boundary above the engine is
    /// expected to confirm before calling.
    pub async fn clear(&self, chat_id: &ChatId) -> Result<()> {
        self.fetch_chat(chat_id).await?;
        self.store
            .set(&paths::messages(chat_id), Value::Null)
            .await?;
        info!(chat = %chat_id, "chat cleared");
        Ok(())
    }

    /// Live unread counter for one member in one chat.
    pub async fn subscribe_unread(&self, chat_id: &ChatId, member: &Handle) -> Result<UnreadFeed> {
        UnreadFeed::open(&self.store, chat_id, member).await
    }

    async fn fetch_chat(&self, chat_id: &ChatId) -> Result<ChatRecord> {
        let value = self.store.get(&paths::chat(chat_id)).await?;
        if value.is_null() {
            return Err(EngineError::NotFound(format!("chat {chat_id}")));
        }
        Ok(serde_json::from_value(value).map_err(StoreError::from)?)
    }
}

/// Live bounded message window for one chat, oldest first.
pub struct MessageFeed {
    sub: Subscription,
}

impl MessageFeed {
    pub fn current(&self) -> Vec<MessageRecord> {
        let snapshot = self.sub.current();
        let Some(rows) = snapshot.as_array() else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|raw| match serde_json::from_value(raw.clone()) {
                Ok(msg) => Some(msg),
                Err(err) => {
                    warn!(error = %err, "skipping undecodable message record");
                    None
                }
            })
            .collect()
    }

    pub async fn changed(&mut self) -> echo_store::Result<()> {
        self.sub.changed().await
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value).map_err(StoreError::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_shared::Directory;
    use echo_store::MemoryStore;

    use crate::registry::ChatRegistry;

    fn handle(s: &str) -> Handle {
        Handle::parse(s).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        ledger: MessageLedger<MemoryStore>,
        chat: ChatId,
    }

    /// DM between NG and VW, empty ledger.
    async fn dm_fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let ids = Arc::new(PushIdGenerator::new());
        let registry = ChatRegistry::new(
            Arc::clone(&store),
            Arc::new(Directory::with_defaults()),
            Arc::clone(&ids),
        );
        let chat = registry
            .create_direct_chat(&handle("NG"), &handle("VW"))
            .await
            .unwrap();
        let ledger = MessageLedger::new(Arc::clone(&store), ids, EngineConfig::default());
        Fixture { store, ledger, chat }
    }

    async fn message_of(fx: &Fixture, id: &MessageId) -> MessageRecord {
        let raw = fx.store.get(&paths::message(&fx.chat, id)).await.unwrap();
        serde_json::from_value(raw).unwrap()
    }

    async fn unread_of(fx: &Fixture, who: &str) -> u32 {
        let raw = fx
            .store
            .get(&paths::chat_unread(&fx.chat, &handle(who)))
            .await
            .unwrap();
        raw.as_u64().unwrap_or(0) as u32
    }

    #[tokio::test]
    async fn send_stamps_sender_and_increments_other_unread() {
        let fx = dm_fixture().await;
        let id = fx
            .ledger
            .send(&fx.chat, &handle("NG"), Some("hello"), None, None)
            .await
            .unwrap();

        let msg = message_of(&fx, &id).await;
        assert!(msg.is_read_by(&handle("NG")));
        assert!(!msg.is_read_by(&handle("VW")));
        assert_eq!(unread_of(&fx, "VW").await, 1);
        assert_eq!(unread_of(&fx, "NG").await, 0);

        // Summary fields updated in the same commit.
        let chat_raw = fx.store.get(&paths::chat(&fx.chat)).await.unwrap();
        let chat: ChatRecord = serde_json::from_value(chat_raw).unwrap();
        assert_eq!(chat.last_message, "hello");
        assert_eq!(chat.last_message_from, Some(handle("NG")));
        assert_eq!(chat.last_message_time, Some(msg.timestamp));
    }

    #[tokio::test]
    async fn send_requires_text_or_media_and_membership() {
        let fx = dm_fixture().await;

        assert!(matches!(
            fx.ledger
                .send(&fx.chat, &handle("NG"), Some("   "), None, None)
                .await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            fx.ledger
                .send(&fx.chat, &handle("ST"), Some("hi"), None, None)
                .await,
            Err(EngineError::Authorization(_))
        ));

        // Media-only is fine and summarizes as the media placeholder.
        fx.ledger
            .send(&fx.chat, &handle("NG"), None, None, Some("https://x/img.png"))
            .await
            .unwrap();
        let chat_raw = fx.store.get(&paths::chat(&fx.chat)).await.unwrap();
        let chat: ChatRecord = serde_json::from_value(chat_raw).unwrap();
        assert_eq!(chat.last_message, MEDIA_SUMMARY_TEXT);
    }

    #[tokio::test]
    async fn unread_tracks_sends_since_last_mark_read() {
        let fx = dm_fixture().await;
        let (ng, vw) = (handle("NG"), handle("VW"));

        fx.ledger.send(&fx.chat, &ng, Some("one"), None, None).await.unwrap();
        fx.ledger.send(&fx.chat, &ng, Some("two"), None, None).await.unwrap();
        assert_eq!(unread_of(&fx, "VW").await, 2);

        fx.ledger.mark_read(&fx.chat, &vw).await.unwrap();
        assert_eq!(unread_of(&fx, "VW").await, 0);

        fx.ledger.send(&fx.chat, &ng, Some("three"), None, None).await.unwrap();
        fx.ledger.send(&fx.chat, &vw, Some("mine"), None, None).await.unwrap();
        // Only the other party's message counts.
        assert_eq!(unread_of(&fx, "VW").await, 1);
    }

    #[tokio::test]
    async fn mark_read_stamps_the_recent_window() {
        let fx = dm_fixture().await;
        let (ng, vw) = (handle("NG"), handle("VW"));

        let id = fx
            .ledger
            .send(&fx.chat, &ng, Some("hello"), None, None)
            .await
            .unwrap();
        fx.ledger.mark_read(&fx.chat, &vw).await.unwrap();

        let msg = message_of(&fx, &id).await;
        assert!(msg.is_read_by(&vw));
        assert!(msg.is_read_by(&ng));
    }

    #[tokio::test]
    async fn reaction_double_toggle_ends_absent() {
        let fx = dm_fixture().await;
        let ng = handle("NG");
        let id = fx
            .ledger
            .send(&fx.chat, &ng, Some("hello"), None, None)
            .await
            .unwrap();

        fx.ledger.set_reaction(&fx.chat, &id, &ng, "👍").await.unwrap();
        assert!(message_of(&fx, &id).await.has_reaction("👍", &ng));

        fx.ledger.set_reaction(&fx.chat, &id, &ng, "👍").await.unwrap();
        let msg = message_of(&fx, &id).await;
        assert!(!msg.has_reaction("👍", &ng));
        // The empty reaction branch is pruned entirely.
        assert!(msg.reactions.is_empty());
    }

    #[tokio::test]
    async fn one_member_may_hold_several_emoji() {
        let fx = dm_fixture().await;
        let ng = handle("NG");
        let id = fx
            .ledger
            .send(&fx.chat, &ng, Some("hello"), None, None)
            .await
            .unwrap();

        fx.ledger.set_reaction(&fx.chat, &id, &ng, "👍").await.unwrap();
        fx.ledger.set_reaction(&fx.chat, &id, &ng, "🔥").await.unwrap();

        let msg = message_of(&fx, &id).await;
        assert!(msg.has_reaction("👍", &ng));
        assert!(msg.has_reaction("🔥", &ng));
    }

    #[tokio::test]
    async fn delete_is_sender_only_and_idempotent() {
        let fx = dm_fixture().await;
        let (ng, vw) = (handle("NG"), handle("VW"));
        let id = fx
            .ledger
            .send(&fx.chat, &ng, Some("oops"), None, Some("https://x/img.png"))
            .await
            .unwrap();
        fx.ledger.set_reaction(&fx.chat, &id, &vw, "😮").await.unwrap();

        // Non-sender: no-op, message unchanged.
        fx.ledger.delete(&fx.chat, &id, &vw).await.unwrap();
        let msg = message_of(&fx, &id).await;
        assert_eq!(msg.text, "oops");
        assert!(!msg.deleted);

        // Sender: tombstoned, media gone, reactions and read-by kept.
        fx.ledger.delete(&fx.chat, &id, &ng).await.unwrap();
        let msg = message_of(&fx, &id).await;
        assert!(msg.deleted);
        assert_eq!(msg.text, TOMBSTONE_TEXT);
        assert!(msg.media_url.is_none());
        assert!(msg.has_reaction("😮", &vw));
        assert!(msg.is_read_by(&ng));

        // Second delete is a no-op, not an error.
        fx.ledger.delete(&fx.chat, &id, &ng).await.unwrap();
        assert_eq!(message_of(&fx, &id).await.text, TOMBSTONE_TEXT);
    }

    #[tokio::test]
    async fn vanished_targets_are_not_found() {
        let fx = dm_fixture().await;
        let missing = MessageId::new("nope");

        assert!(matches!(
            fx.ledger
                .set_reaction(&fx.chat, &missing, &handle("NG"), "👍")
                .await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            fx.ledger.delete(&fx.chat, &missing, &handle("NG")).await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            fx.ledger
                .send(&ChatId::new("gone"), &handle("NG"), Some("hi"), None, None)
                .await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn clear_removes_messages_but_keeps_chat_metadata() {
        let fx = dm_fixture().await;
        let ng = handle("NG");
        fx.ledger.send(&fx.chat, &ng, Some("one"), None, None).await.unwrap();
        fx.ledger.send(&fx.chat, &ng, Some("two"), None, None).await.unwrap();

        fx.ledger.clear(&fx.chat).await.unwrap();

        let msgs = fx.store.get(&paths::messages(&fx.chat)).await.unwrap();
        assert!(msgs.is_null());
        let chat_raw = fx.store.get(&paths::chat(&fx.chat)).await.unwrap();
        let chat: ChatRecord = serde_json::from_value(chat_raw).unwrap();
        assert_eq!(chat.last_message, "two");
    }

    #[tokio::test]
    async fn message_window_is_ordered_and_bounded() {
        let fx = dm_fixture().await;
        let ng = handle("NG");

        let mut feed = fx.ledger.subscribe_messages(&fx.chat, Some(2)).await.unwrap();
        for text in ["one", "two", "three"] {
            fx.ledger.send(&fx.chat, &ng, Some(text), None, None).await.unwrap();
        }

        feed.changed().await.unwrap();
        let window = feed.current();
        let texts: Vec<&str> = window.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["two", "three"]);
        assert!(window[0].timestamp <= window[1].timestamp);
        assert!(window[0].id < window[1].id);

        // Replies reference a message in the same chat.
        let reply_to = window[1].id.clone();
        fx.ledger
            .send(&fx.chat, &handle("VW"), Some("re"), Some(&reply_to), None)
            .await
            .unwrap();
        feed.changed().await.unwrap();
        let window = feed.current();
        assert_eq!(window.last().unwrap().reply_to, Some(reply_to));
    }
}
