//! Logical store paths.
//!
//! The persisted tree layout is the wire contract shared with every
//! deployed client, so all paths are built through the typed helpers in
//! [`paths`] rather than by string formatting at call sites:
//!
//! ```text
//! users/{handle}
//! chats/{chatId}/members/{handle}
//! chats/{chatId}/unread/{handle}
//! chats/{chatId}/messages/{msgId}
//! presence/{connectionId}
//! ```

use echo_shared::{ChatId, ConnectionId, Handle, MessageId};

/// A slash-separated path into the backend's value tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath(Vec<String>);

impl StorePath {
    /// The tree root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Append one segment.
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `self` is `other` or an ancestor of `other`.
    pub fn is_prefix_of(&self, other: &StorePath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Whether a write at `self` is visible from a watch on `other`
    /// (either may be the ancestor).
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl std::fmt::Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("/")
        } else {
            f.write_str(&self.0.join("/"))
        }
    }
}

/// Typed builders for every path the engine touches.
pub mod paths {
    use super::*;

    pub fn user(handle: &Handle) -> StorePath {
        StorePath::root().child("users").child(handle.as_str())
    }

    pub fn chats() -> StorePath {
        StorePath::root().child("chats")
    }

    pub fn chat(id: &ChatId) -> StorePath {
        chats().child(id.as_str())
    }

    pub fn chat_member(id: &ChatId, handle: &Handle) -> StorePath {
        chat(id).child("members").child(handle.as_str())
    }

    pub fn chat_unread(id: &ChatId, handle: &Handle) -> StorePath {
        chat(id).child("unread").child(handle.as_str())
    }

    pub fn chat_last_message(id: &ChatId) -> StorePath {
        chat(id).child("lastMessage")
    }

    pub fn chat_last_message_from(id: &ChatId) -> StorePath {
        chat(id).child("lastMessageFrom")
    }

    pub fn chat_last_message_time(id: &ChatId) -> StorePath {
        chat(id).child("lastMessageTime")
    }

    pub fn messages(id: &ChatId) -> StorePath {
        chat(id).child("messages")
    }

    pub fn message(id: &ChatId, msg: &MessageId) -> StorePath {
        messages(id).child(msg.as_str())
    }

    pub fn message_read_by(id: &ChatId, msg: &MessageId, handle: &Handle) -> StorePath {
        message(id, msg).child("readBy").child(handle.as_str())
    }

    pub fn message_reaction(
        id: &ChatId,
        msg: &MessageId,
        emoji: &str,
        handle: &Handle,
    ) -> StorePath {
        message(id, msg)
            .child("reactions")
            .child(emoji)
            .child(handle.as_str())
    }

    pub fn presence() -> StorePath {
        StorePath::root().child("presence")
    }

    pub fn presence_of(conn: ConnectionId) -> StorePath {
        presence().child(conn.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_prefix() {
        let chats = StorePath::root().child("chats");
        let nested = chats.clone().child("c1").child("members").child("NG");

        assert_eq!(nested.to_string(), "chats/c1/members/NG");
        assert!(chats.is_prefix_of(&nested));
        assert!(!nested.is_prefix_of(&chats));
        assert!(StorePath::root().is_prefix_of(&chats));
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = StorePath::root().child("chats").child("c1");
        let b = StorePath::root().child("chats");
        let c = StorePath::root().child("presence");

        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn typed_builders_match_the_wire_contract() {
        let ng = Handle::parse("NG").unwrap();
        let chat = ChatId::new("c1");
        let msg = MessageId::new("m1");

        assert_eq!(paths::user(&ng).to_string(), "users/NG");
        assert_eq!(paths::chat_unread(&chat, &ng).to_string(), "chats/c1/unread/NG");
        assert_eq!(
            paths::message_reaction(&chat, &msg, "👍", &ng).to_string(),
            "chats/c1/messages/m1/reactions/👍/NG"
        );
    }
}
