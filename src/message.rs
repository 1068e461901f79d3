//! Message envelope
//!
//! JSON envelope shared by the room actor and the session write loops.
//! Encoded once per broadcast; every recipient gets a clone of the same
//! `Frame` and decodes it on its own write path.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::color;
use crate::error::AppError;

/// Encoded envelope bytes, shared read-only between recipients
pub type Frame = Arc<[u8]>;

/// What a message carries
///
/// Notifications hold pre-rendered display text, user messages hold the raw
/// line that is formatted on display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Notification,
    UserMessage,
}

/// A chat event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl Message {
    /// A line typed by `sender`, stamped now
    pub fn user(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sender: sender.into(),
            timestamp: Utc::now(),
            kind: MessageKind::UserMessage,
        }
    }

    /// A room notification about `sender` (join/leave)
    pub fn notification(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sender: sender.into(),
            timestamp: Utc::now(),
            kind: MessageKind::Notification,
        }
    }

    /// A system notice addressed to one session, with no sender
    pub fn notice(content: impl Into<String>) -> Self {
        Self::notification(content, String::new())
    }

    pub fn encode(&self) -> Frame {
        match serde_json::to_vec(self) {
            Ok(bytes) => Frame::from(bytes),
            Err(e) => {
                error!("Failed to encode message: {}", e);
                Frame::from(Vec::new())
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AppError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Text written to a terminal
    pub fn render(&self) -> String {
        match self.kind {
            MessageKind::Notification => {
                format!("\n{}{}{}", color::NOTIFICATION, self.content, color::RESET)
            }
            MessageKind::UserMessage => format!(
                "\n⏳ {}[{}] 🤖 {} 💬 {}{}\n",
                color::WHITE_TEXT,
                self.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                self.sender,
                self.content,
                color::RESET,
            ),
        }
    }

    /// Rendered text as stored in the room history
    pub fn history_record(&self) -> String {
        let rendered = self.render();
        match rendered.strip_prefix('\n') {
            Some(record) => record.to_string(),
            None => rendered,
        }
    }
}
