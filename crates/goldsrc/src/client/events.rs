use crate::net::protocol::{GameEvent, Sound, StaticSound};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The host asked to leave.
    Requested,
    TimedOut,
    /// The server refused the connect request.
    Rejected(String),
    /// The server dropped us with a message.
    Server(String),
    /// The session desynchronised and could not continue.
    Protocol(String),
}

impl DisconnectReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Requested => "disconnected",
            Self::TimedOut => "timed out",
            Self::Rejected(reason) | Self::Server(reason) | Self::Protocol(reason) => reason,
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications queued for the host, drained with `Client::drain_events`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Disconnected { reason: DisconnectReason },
    /// Server info arrived and the level is loading.
    GameInitialized,
    /// First entity snapshot after signon; movement starts.
    GameStarted,
    Print { text: String },
    CenterPrint { text: String },
    GameMessage { name: String, data: Vec<u8> },
    TempEntity { kind: u8, data: Vec<u8> },
    Sound(Sound),
    StaticSound(StaticSound),
    Event(GameEvent),
    FileReceived { name: String, size: usize },
    FileTransferFailed { name: String },
    LightStyle { index: u8, pattern: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(DisconnectReason::Requested.as_str(), "disconnected");
        assert_eq!(DisconnectReason::TimedOut.as_str(), "timed out");
        assert_eq!(
            DisconnectReason::Rejected("Server is full.".into()).to_string(),
            "Server is full."
        );
    }
}
