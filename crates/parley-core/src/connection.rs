//! Connection state as seen by the synchronizer.

use std::fmt;

/// Whether the duplex channel is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No usable channel. Emissions fail until the transport reconnects.
    #[default]
    Disconnected,
    /// Channel open.
    Connected,
}

impl ConnectionState {
    /// Returns true if connected.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
        })
    }
}
