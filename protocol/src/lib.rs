//! Wire protocol for the Gomoku session server: the `\n`-delimited JSON
//! envelope codec and the typed messages carried inside it.

pub mod envelope;
pub mod messages;

pub use envelope::{
    encode, unix_timestamp, Envelope, FrameDecodeError, FrameTooLarge, Framer,
    DEFAULT_MAX_FRAME_BYTES,
};
pub use messages::{tags, ClientMessage, PayloadMismatch, Seat, ServerMessage, ServerMessageIn};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_newtype {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

/// Opaque identifier for a connected client, assigned by the server at
/// `lobby_join` time. Transparent `String` on the wire to stay compatible
/// with the reference implementation's identifiers.
string_newtype!(ClientId);

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

/// Identifier for a room, chosen by the server at `room_create` time.
string_newtype!(RoomId);

impl fmt::Debug for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomId({})", self.0)
    }
}

/// Opaque bearer token handed to a client at `lobby_join`, used to resume
/// identity across a reconnect (§4.4.2). Debug-formatted as a truncated
/// prefix so it never lands whole in a log line.
string_newtype!(SessionToken);

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "SessionToken({prefix}...)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_token_debug_does_not_leak_the_full_value() {
        let token = SessionToken::from("abcdefghijklmnop".to_string());
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("ghijklmnop"));
    }
}
