//! Error types for the chat relay
//!
//! One application-level enum covers handshake, envelope decoding, transport
//! and room membership failures. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::{RoomName, Username};

/// Application-level errors
///
/// None of these are fatal to the process. Session errors end one session,
/// room errors are reported to the requester and the room keeps running.
#[derive(Debug, Error)]
pub enum AppError {
    /// Client went away or failed to read during the username/room exchange
    #[error("handshake aborted while reading {stage}")]
    Handshake {
        stage: &'static str,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Envelope bytes could not be decoded
    #[error("malformed envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// Socket read/write failure on an established connection
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Room already holds the maximum number of members
    #[error("room {room} is full ({max} members)")]
    CapacityExceeded { room: RoomName, max: usize },

    /// Another member of the room already uses this username
    #[error("username {username} is already taken in room {room}")]
    IdentityTaken { room: RoomName, username: Username },

    /// Member mailbox was full during fan-out
    #[error("{username} is not keeping up with the room")]
    UnresponsiveConsumer { username: Username },

    /// The room's control loop has exited
    #[error("room {0} is closed")]
    RoomClosed(RoomName),

    /// The server stopped accepting work
    #[error("server is shutting down")]
    ShuttingDown,
}

impl AppError {
    /// Handshake error for a client that hung up mid-prompt
    pub fn disconnected(stage: &'static str) -> Self {
        AppError::Handshake {
            stage,
            source: None,
        }
    }

    /// Text shown to a client whose join was refused
    pub fn notice(&self) -> String {
        match self {
            AppError::CapacityExceeded { room, .. } => {
                format!("❌ Room {} is full. Cannot join.\n", room)
            }
            AppError::IdentityTaken { room, username } => {
                format!("❌ Username {} is already in use in room {}.\n", username, room)
            }
            AppError::RoomClosed(room) => format!("❌ Room {} is closed.\n", room),
            AppError::ShuttingDown => "❌ Server is shutting down.\n".to_string(),
            other => format!("❌ {}\n", other),
        }
    }
}
