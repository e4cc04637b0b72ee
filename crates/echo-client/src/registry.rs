//! Chat entity lifecycle: DM and group creation, membership, and the live
//! per-user chat list.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use echo_shared::time::now_millis;
use echo_shared::{ChatId, Directory, Handle};
use echo_store::path::paths;
use echo_store::{PushIdGenerator, StoreBackend, StoreError, Subscription};

use crate::models::{ChatKind, ChatRecord};
use crate::sidebar::sort_chats;
use crate::{EngineError, Result};

/// Owns chat creation and membership mutation. All writes go through the
/// backend; the registry itself keeps no state beyond its handles.
pub struct ChatRegistry<B> {
    store: Arc<B>,
    directory: Arc<Directory>,
    ids: Arc<PushIdGenerator>,
}

impl<B: StoreBackend> ChatRegistry<B> {
    pub fn new(store: Arc<B>, directory: Arc<Directory>, ids: Arc<PushIdGenerator>) -> Self {
        Self {
            store,
            directory,
            ids,
        }
    }

    /// Create (or find) the DM between two handles.
    ///
    /// DM identity is the canonical unordered-pair id, and the write is a
    /// backend-side write-if-absent, so two clients racing to create the
    /// same DM converge on one chat. Returns the chat id either way.
    pub async fn create_direct_chat(&self, a: &Handle, b: &Handle) -> Result<ChatId> {
        self.require_known(a)?;
        self.require_known(b)?;
        if a == b {
            return Err(EngineError::Validation(
                "a direct chat needs two distinct members".into(),
            ));
        }

        let id = ChatId::direct(a, b);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let record = ChatRecord {
            id: id.clone(),
            kind: ChatKind::Dm,
            name: format!("{lo} ↔ {hi}"),
            topic: String::new(),
            created_by: a.clone(),
            members: BTreeMap::from([(a.clone(), true), (b.clone(), true)]),
            unread: BTreeMap::new(),
            created_at: now_millis(),
            last_message: String::new(),
            last_message_from: None,
            last_message_time: None,
        };

        let created = self
            .store
            .create(&paths::chat(&id), encode(&record)?)
            .await?;
        if created {
            info!(chat = %id, "direct chat created");
        } else {
            debug!(chat = %id, "direct chat already exists");
        }
        Ok(id)
    }

    /// Create a group chat. The creator is always a member; other members
    /// are deduplicated and must exist in the directory.
    pub async fn create_group(
        &self,
        creator: &Handle,
        name: &str,
        topic: &str,
        members: &[Handle],
    ) -> Result<ChatId> {
        self.require_known(creator)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("group name is required".into()));
        }

        let mut member_map = BTreeMap::from([(creator.clone(), true)]);
        for member in members {
            self.require_known(member)?;
            member_map.insert(member.clone(), true);
        }

        let id = ChatId::new(self.ids.generate());
        let record = ChatRecord {
            id: id.clone(),
            kind: ChatKind::Group,
            name: name.to_string(),
            topic: topic.trim().to_string(),
            created_by: creator.clone(),
            members: member_map,
            unread: BTreeMap::new(),
            created_at: now_millis(),
            last_message: String::new(),
            last_message_from: None,
            last_message_time: None,
        };

        self.store.set(&paths::chat(&id), encode(&record)?).await?;
        info!(chat = %id, name, members = record.members.len(), "group created");
        Ok(id)
    }

    /// Add a member to a group. Creator-only.
    pub async fn add_member(
        &self,
        requester: &Handle,
        chat_id: &ChatId,
        target: &Handle,
    ) -> Result<()> {
        self.require_known(target)?;
        let chat = self.fetch_chat(chat_id).await?;
        self.require_creator(&chat, requester, "add members")?;

        self.store
            .set(&paths::chat_member(chat_id, target), Value::Bool(true))
            .await?;
        info!(chat = %chat_id, member = %target, "member added");
        Ok(())
    }

    /// Remove a member from a group. Creator-only; the creator themself
    /// cannot be removed, so a group never becomes creator-less.
    pub async fn remove_member(
        &self,
        requester: &Handle,
        chat_id: &ChatId,
        target: &Handle,
    ) -> Result<()> {
        let chat = self.fetch_chat(chat_id).await?;
        self.require_creator(&chat, requester, "remove members")?;
        if target == &chat.created_by {
            return Err(EngineError::Validation(
                "the group creator cannot be removed".into(),
            ));
        }

        self.store
            .set(&paths::chat_member(chat_id, target), Value::Null)
            .await?;
        info!(chat = %chat_id, member = %target, "member removed");
        Ok(())
    }

    /// Live list of the chats visible to `viewer`, re-evaluated on every
    /// backend change, sorted for the sidebar.
    pub async fn subscribe_chats(&self, viewer: &Handle) -> Result<ChatListFeed> {
        let sub = self.store.subscribe(&paths::chats()).await?;
        Ok(ChatListFeed {
            sub,
            viewer: viewer.clone(),
        })
    }

    async fn fetch_chat(&self, chat_id: &ChatId) -> Result<ChatRecord> {
        let value = self.store.get(&paths::chat(chat_id)).await?;
        if value.is_null() {
            return Err(EngineError::NotFound(format!("chat {chat_id}")));
        }
        Ok(serde_json::from_value(value).map_err(StoreError::from)?)
    }

    fn require_known(&self, handle: &Handle) -> Result<()> {
        if self.directory.contains(handle) {
            Ok(())
        } else {
            Err(EngineError::Validation(format!(
                "unknown call-sign: {handle}"
            )))
        }
    }

    fn require_creator(&self, chat: &ChatRecord, requester: &Handle, what: &str) -> Result<()> {
        if chat.created_by == *requester {
            Ok(())
        } else {
            Err(EngineError::Authorization(format!(
                "only the group creator can {what}"
            )))
        }
    }
}

/// Live, sorted chat list for one viewer.
pub struct ChatListFeed {
    sub: Subscription,
    viewer: Handle,
}

impl ChatListFeed {
    /// Decode the latest snapshot: chats where the viewer is a member,
    /// sorted by last activity (message-less chats last).
    pub fn current(&self) -> Vec<ChatRecord> {
        let snapshot = self.sub.current();
        let Some(map) = snapshot.as_object() else {
            return Vec::new();
        };

        let mut chats: Vec<ChatRecord> = map
            .values()
            .filter_map(|raw| match serde_json::from_value(raw.clone()) {
                Ok(chat) => Some(chat),
                Err(err) => {
                    warn!(error = %err, "skipping undecodable chat record");
                    None
                }
            })
            .filter(|chat: &ChatRecord| chat.is_member(&self.viewer))
            .collect();

        sort_chats(&mut chats);
        chats
    }

    /// Wait for the next chat list snapshot.
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
    use echo_store::MemoryStore;

    fn handle(s: &str) -> Handle {
        Handle::parse(s).unwrap()
    }

    fn registry(store: &Arc<MemoryStore>) -> ChatRegistry<MemoryStore> {
        ChatRegistry::new(
            Arc::clone(store),
            Arc::new(Directory::with_defaults()),
            Arc::new(PushIdGenerator::new()),
        )
    }

    #[tokio::test]
    async fn direct_chat_creation_is_idempotent_and_order_independent() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let (ng, vw) = (handle("NG"), handle("VW"));

        let first = registry.create_direct_chat(&ng, &vw).await.unwrap();
        let second = registry.create_direct_chat(&vw, &ng).await.unwrap();
        assert_eq!(first, second);

        // Only one chat entity exists.
        let chats = store.get(&paths::chats()).await.unwrap();
        assert_eq!(chats.as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn direct_chat_rejects_unknown_or_identical_handles() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let ng = handle("NG");

        let unknown = handle("ZZ");
        assert!(matches!(
            registry.create_direct_chat(&ng, &unknown).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            registry.create_direct_chat(&ng, &ng).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn group_requires_a_name_and_dedupes_members() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let ng = handle("NG");

        assert!(matches!(
            registry.create_group(&ng, "   ", "", &[]).await,
            Err(EngineError::Validation(_))
        ));

        let id = registry
            .create_group(&ng, "ops", "", &[handle("VW"), handle("VW"), handle("NG")])
            .await
            .unwrap();

        let raw = store.get(&paths::chat(&id)).await.unwrap();
        let chat: ChatRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(chat.members.len(), 2);
        assert_eq!(chat.created_by, ng);
        assert!(chat.last_message_time.is_none());
    }

    #[tokio::test]
    async fn membership_is_creator_only_and_protects_the_creator() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let (ng, vw, st) = (handle("NG"), handle("VW"), handle("ST"));

        let id = registry
            .create_group(&ng, "ops", "", &[vw.clone()])
            .await
            .unwrap();

        assert!(matches!(
            registry.add_member(&vw, &id, &st).await,
            Err(EngineError::Authorization(_))
        ));
        assert!(matches!(
            registry.remove_member(&ng, &id, &ng).await,
            Err(EngineError::Validation(_))
        ));

        registry.add_member(&ng, &id, &st).await.unwrap();
        registry.remove_member(&ng, &id, &vw).await.unwrap();

        let raw = store.get(&paths::chat(&id)).await.unwrap();
        let chat: ChatRecord = serde_json::from_value(raw).unwrap();
        assert!(chat.is_member(&st));
        assert!(!chat.is_member(&vw));
    }

    #[tokio::test]
    async fn membership_mutation_on_a_vanished_chat_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);

        let missing = ChatId::new("nope");
        assert!(matches!(
            registry
                .add_member(&handle("NG"), &missing, &handle("VW"))
                .await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn chat_feed_filters_to_the_viewer() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let (ng, vw, st) = (handle("NG"), handle("VW"), handle("ST"));

        registry.create_direct_chat(&ng, &vw).await.unwrap();
        registry
            .create_group(&vw, "others", "", &[st.clone()])
            .await
            .unwrap();

        let feed = registry.subscribe_chats(&ng).await.unwrap();
        let visible = feed.current();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].kind, ChatKind::Dm);

        let feed = registry.subscribe_chats(&vw).await.unwrap();
        assert_eq!(feed.current().len(), 2);
    }
}
