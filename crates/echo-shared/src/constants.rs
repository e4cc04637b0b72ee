use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "ECHO";

/// Maximum handle length in characters
pub const MAX_HANDLE_LEN: usize = 12;

/// Default size of the live message window delivered to an open chat
pub const MESSAGE_WINDOW_LIMIT: usize = 60;

/// How many of the most recent messages a read-mark touches
pub const MARK_READ_WINDOW: usize = 50;

/// How long a typing marker stays asserted without being re-armed
pub const TYPING_TIMEOUT: Duration = Duration::from_secs(3);

/// Text that replaces the body of a deleted message
pub const TOMBSTONE_TEXT: &str = "🗑 Message deleted";

/// Chat-list summary shown for a media-only message
pub const MEDIA_SUMMARY_TEXT: &str = "📎 Media";
