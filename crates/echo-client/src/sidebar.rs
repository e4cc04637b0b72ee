//! Sidebar projection: ordering, display titles, unread badges, and the
//! decision of when a new-message notification fires.
//!
//! The projection is pure state over snapshots. It keeps one high-water
//! mark per chat (the newest message timestamp it has acted on) so that
//! replayed or re-sorted snapshots never re-fire a notification.

use std::collections::HashMap;

use tracing::debug;

use echo_shared::{ChatId, Handle};

use crate::models::{ChatKind, ChatRecord};
use crate::presence::PresenceSnapshot;

/// Sidebar order: most recent activity first, message-less chats last
/// (newest created first among those). Chat id breaks exact ties so the
/// order is stable across snapshots.
pub fn sort_chats(chats: &mut Vec<ChatRecord>) {
    chats.sort_by(|a, b| match (a.last_message_time, b.last_message_time) {
        (Some(at), Some(bt)) => bt.cmp(&at).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)),
    });
}

/// One row of the rendered sidebar.
#[derive(Debug, Clone, PartialEq)]
pub struct SidebarEntry {
    pub chat: ChatRecord,
    /// DM rows show the other party's handle; group rows show the name.
    pub title: String,
    /// DM: the other party is online. Group: any other member is online.
    pub online: bool,
    pub unread: u32,
}

/// A notification the presentation layer should surface.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationTrigger {
    pub chat: ChatId,
    pub from: Handle,
    pub text: String,
}

/// Per-viewer sidebar state fed by chat list and presence snapshots.
pub struct SidebarProjection {
    viewer: Handle,
    active: Option<ChatId>,
    high_water: HashMap<ChatId, i64>,
}

impl SidebarProjection {
    pub fn new(viewer: Handle) -> Self {
        Self {
            viewer,
            active: None,
            high_water: HashMap::new(),
        }
    }

    /// The chat currently open in the viewport, if any. Messages arriving
    /// there never trigger notifications.
    pub fn set_active(&mut self, chat: Option<ChatId>) {
        self.active = chat;
    }

    pub fn active(&self) -> Option<&ChatId> {
        self.active.as_ref()
    }

    /// Fold the latest snapshots into sidebar rows plus any notification
    /// triggers. `chats` must already be sorted (the chat feed sorts).
    ///
    /// A trigger fires when a chat's newest activity is strictly newer
    /// than the high-water mark, came from someone else, and the chat is
    /// not active. The mark only ever rises, so stale snapshots are inert.
    pub fn project(
        &mut self,
        chats: &[ChatRecord],
        presence: &PresenceSnapshot,
    ) -> (Vec<SidebarEntry>, Vec<NotificationTrigger>) {
        let mut entries = Vec::with_capacity(chats.len());
        let mut triggers = Vec::new();

        for chat in chats {
            entries.push(SidebarEntry {
                chat: chat.clone(),
                title: self.title_for(chat),
                online: presence.any_other_member_online(chat, &self.viewer),
                unread: chat.unread_for(&self.viewer),
            });

            let Some(at) = chat.last_message_time else {
                continue;
            };
            let seen = self.high_water.get(&chat.id).copied();
            if seen.is_some_and(|mark| at <= mark) {
                continue;
            }
            self.high_water.insert(chat.id.clone(), at);

            let Some(from) = chat.last_message_from.clone() else {
                continue;
            };
            if from == self.viewer || self.active.as_ref() == Some(&chat.id) {
                continue;
            }
            debug!(chat = %chat.id, from = %from, "notification trigger");
            triggers.push(NotificationTrigger {
                chat: chat.id.clone(),
                from,
                text: chat.last_message.clone(),
            });
        }

        (entries, triggers)
    }

    fn title_for(&self, chat: &ChatRecord) -> String {
        match chat.kind {
            ChatKind::Dm => chat
                .other_member(&self.viewer)
                .map(|h| h.to_string())
                .unwrap_or_else(|| chat.name.clone()),
            ChatKind::Group => chat.name.clone(),
        }
    }
}
