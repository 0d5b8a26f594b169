//! Synchronization configuration.

use std::time::Duration;

/// Time allowed for the server to acknowledge a `send_message`.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before an errored message is retried automatically.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Quiet period after the last keystroke before typing is reported stopped.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(1);

/// Tunables for [`crate::ChatClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Acknowledgement deadline per send attempt.
    pub ack_timeout: Duration,
    /// Automatic retry delay after a failed attempt.
    pub retry_delay: Duration,
    /// Typing debounce window.
    pub typing_idle: Duration,
    /// Send a read receipt when a message from someone else arrives in the
    /// open, joined conversation.
    pub read_on_receive: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            typing_idle: DEFAULT_TYPING_IDLE,
            read_on_receive: true,
        }
    }
}
