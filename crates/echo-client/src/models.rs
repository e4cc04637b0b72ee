//! Wire models for the records persisted in the shared tree.
//!
//! Field names are the deployed contract (camelCase, `type` for the chat
//! kind), so every struct round-trips byte-for-field against records
//! written by existing clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use echo_shared::{ChatId, Handle, MessageId};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Direct (two-party) or group (N-party) conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Dm,
    Group,
}

/// A chat entity with its denormalized summary fields.
///
/// `members` maps handle to presence-in-chat (removal deletes the key);
/// `unread` carries the per-member counter maintained transactionally by
/// the ledger. Summary fields exist so the chat list renders without
/// reading any ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: ChatId,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
    pub created_by: Handle,
    pub members: BTreeMap<Handle, bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unread: BTreeMap<Handle, u32>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_from: Option<Handle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<i64>,
}

impl ChatRecord {
    pub fn is_member(&self, handle: &Handle) -> bool {
        self.members.get(handle).copied().unwrap_or(false)
    }

    /// Member handles, in canonical order.
    pub fn member_handles(&self) -> impl Iterator<Item = &Handle> {
        self.members
            .iter()
            .filter(|(_, present)| **present)
            .map(|(h, _)| h)
    }

    /// For a DM, the party that is not `viewer`.
    pub fn other_member(&self, viewer: &Handle) -> Option<&Handle> {
        self.member_handles().find(|h| *h != viewer)
    }

    pub fn unread_for(&self, handle: &Handle) -> u32 {
        self.unread.get(handle).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One ledger entry.
///
/// Once `deleted` is set the text is the tombstone and `mediaUrl` is gone;
/// reactions and the read-by set survive deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub from: Handle,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reactions: BTreeMap<String, BTreeMap<Handle, bool>>,
    #[serde(default)]
    pub read_by: BTreeMap<Handle, bool>,
    pub timestamp: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl MessageRecord {
    pub fn is_read_by(&self, handle: &Handle) -> bool {
        self.read_by.get(handle).copied().unwrap_or(false)
    }

    pub fn has_reaction(&self, emoji: &str, handle: &Handle) -> bool {
        self.reactions
            .get(emoji)
            .and_then(|who| who.get(handle))
            .copied()
            .unwrap_or(false)
    }

    pub fn reaction_count(&self, emoji: &str) -> usize {
        self.reactions
            .get(emoji)
            .map(|who| who.values().filter(|v| **v).count())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Per-connection presence record. `typing` holds the chat id the owner is
/// typing in; it self-clears within the typing timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub online: bool,
    pub callsign: Handle,
    pub last_seen: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing: Option<ChatId>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Registration record under `users/{handle}`, written once and immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub callsign: Handle,
    pub uid: String,
    pub created_at: i64,
}
