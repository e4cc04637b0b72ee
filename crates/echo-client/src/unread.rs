//! Unread counters, per chat and aggregated.
//!
//! The counters themselves live on the chat records and are written by the
//! ledger (incremented on send, zeroed on mark-read). This module only
//! reads: a live feed on one counter for an open chat header, and a badge
//! aggregate over the whole chat list for the app chrome.

use std::collections::HashMap;
use std::sync::Arc;

use echo_shared::{ChatId, Handle};
use echo_store::path::paths;
use echo_store::{StoreBackend, Subscription};

use crate::models::ChatRecord;
use crate::Result;

/// Live view of one member's unread counter in one chat.
pub struct UnreadFeed {
    sub: Subscription,
}

impl UnreadFeed {
    pub async fn open<B: StoreBackend>(
        store: &Arc<B>,
        chat: &ChatId,
        viewer: &Handle,
    ) -> Result<Self> {
        let sub = store.subscribe(&paths::chat_unread(chat, viewer)).await?;
        Ok(Self { sub })
    }

    /// The counter as of the latest snapshot. Absent or malformed counts
    /// read as zero.
    pub fn current(&self) -> u32 {
        self.sub.current().as_u64().unwrap_or(0) as u32
    }

    pub async fn changed(&mut self) -> echo_store::Result<()> {
        self.sub.changed().await
    }
}

/// Aggregated unread badges for one viewer, folded from a chat list
/// snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnreadBadges {
    per_chat: HashMap<ChatId, u32>,
    total: u64,
}

impl UnreadBadges {
    pub fn from_chats(viewer: &Handle, chats: &[ChatRecord]) -> Self {
        let mut per_chat = HashMap::with_capacity(chats.len());
        let mut total = 0u64;
        for chat in chats {
            let count = chat.unread_for(viewer);
            total += u64::from(count);
            per_chat.insert(chat.id.clone(), count);
        }
        Self { per_chat, total }
    }

    pub fn for_chat(&self, chat: &ChatId) -> u32 {
        self.per_chat.get(chat).copied().unwrap_or(0)
    }

    /// Grand total across all chats. Never underflows: it is recomputed
    /// from the snapshot, not decremented.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn any_unread(&self) -> bool {
        self.total > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatKind;
    use echo_store::MemoryStore;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn handle(s: &str) -> Handle {
        Handle::parse(s).unwrap()
    }

    #[tokio::test]
    async fn feed_tracks_the_counter_and_defaults_to_zero() {
        let store = Arc::new(MemoryStore::new());
        let chat = ChatId::new("c1");
        let vw = handle("VW");

        let mut feed = UnreadFeed::open(&store, &chat, &vw).await.unwrap();
        assert_eq!(feed.current(), 0);

        store
            .set(&paths::chat_unread(&chat, &vw), json!(3))
            .await
            .unwrap();
        feed.changed().await.unwrap();
        assert_eq!(feed.current(), 3);

        store
            .set(&paths::chat_unread(&chat, &vw), json!(0))
            .await
            .unwrap();
        feed.changed().await.unwrap();
        assert_eq!(feed.current(), 0);
    }

    #[test]
    fn badges_aggregate_per_viewer() {
        let ng = handle("NG");
        let make = |id: &str, unread: &[(&str, u32)]| ChatRecord {
            id: ChatId::new(id),
            kind: ChatKind::Group,
            name: id.to_string(),
            topic: String::new(),
            created_by: handle("VW"),
            members: BTreeMap::from([(handle("NG"), true), (handle("VW"), true)]),
            unread: unread.iter().map(|(h, n)| (handle(h), *n)).collect(),
            created_at: 1,
            last_message: String::new(),
            last_message_from: None,
            last_message_time: None,
        };

        let chats = vec![
            make("a", &[("NG", 2), ("VW", 9)]),
            make("b", &[]),
            make("c", &[("NG", 1)]),
        ];
        let badges = UnreadBadges::from_chats(&ng, &chats);

        assert_eq!(badges.for_chat(&ChatId::new("a")), 2);
        assert_eq!(badges.for_chat(&ChatId::new("b")), 0);
        assert_eq!(badges.total(), 3);
        assert!(badges.any_unread());
    }
}
