//! Identifier newtypes used across the workspace.
//!
//! Handles are canonicalized at parse time so a single spelling is used
//! everywhere: in memory, as map keys and on the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::constants::MAX_HANDLE_LEN;
use crate::error::HandleError;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A call-sign: short unique user identifier drawn from the fixed directory.
///
/// The canonical form is uppercase ASCII alphanumerics, 1 to
/// [`MAX_HANDLE_LEN`] characters. [`Handle::parse`] trims and uppercases its
/// input, so `"ng"`, `" NG "` and `"NG"` all name the same user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(String);

impl Handle {
    /// Parse and canonicalize a handle.
    pub fn parse(raw: &str) -> Result<Self, HandleError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(HandleError::Empty);
        }
        if trimmed.chars().count() > MAX_HANDLE_LEN {
            return Err(HandleError::TooLong(trimmed.chars().count()));
        }
        if let Some(bad) = trimmed.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(HandleError::InvalidChar(bad));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Manual serde impls: a handle is a plain string on the wire (both as a
// value and as a map key), and deserialization re-canonicalizes so records
// written by older clients still parse.
impl Serialize for Handle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Handle::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// ChatId
// ---------------------------------------------------------------------------

/// Opaque chat identifier.
///
/// Group chats use generated push ids; direct chats use the canonical
/// unordered-pair key from [`ChatId::direct`], which is what makes DM
/// creation idempotent across concurrent clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Canonical id for the DM between two handles, independent of argument
    /// order.
    pub fn direct(a: &Handle, b: &Handle) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("dm:{lo}:{hi}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Opaque message identifier, assigned by the ledger from a monotonic
/// push-id generator so id order matches generation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ConnectionId
// ---------------------------------------------------------------------------

/// Identifies one live client connection. Presence records are keyed by
/// connection, not by handle: the same user may be online from several
/// devices at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
