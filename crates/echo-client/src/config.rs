//! Engine configuration loaded from environment variables.
//!
//! Every setting has a default matching the deployed clients, so the
//! engine runs with zero configuration.

use std::time::Duration;

use echo_shared::constants::{MARK_READ_WINDOW, MESSAGE_WINDOW_LIMIT, TYPING_TIMEOUT};

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Size of the live message window attached to an open chat.
    /// Env: `ECHO_MESSAGE_WINDOW`
    /// Default: 60
    pub message_window: usize,

    /// How many recent messages a read-mark touches. Older messages stay
    /// unmarked; this bound is part of the read-receipt contract.
    /// Env: `ECHO_MARK_READ_WINDOW`
    /// Default: 50
    pub mark_read_window: usize,

    /// How long a typing marker survives without being re-armed.
    /// Env: `ECHO_TYPING_TIMEOUT_MS`
    /// Default: 3000 ms
    pub typing_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            message_window: MESSAGE_WINDOW_LIMIT,
            mark_read_window: MARK_READ_WINDOW,
            typing_timeout: TYPING_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ECHO_MESSAGE_WINDOW") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.message_window = n,
                _ => tracing::warn!(value = %val, "invalid ECHO_MESSAGE_WINDOW, using default"),
            }
        }

        if let Ok(val) = std::env::var("ECHO_MARK_READ_WINDOW") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.mark_read_window = n,
                _ => tracing::warn!(value = %val, "invalid ECHO_MARK_READ_WINDOW, using default"),
            }
        }

        if let Ok(val) = std::env::var("ECHO_TYPING_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.typing_timeout = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "invalid ECHO_TYPING_TIMEOUT_MS, using default"),
            }
        }

        config
    }
}
