//! Basic type definitions for the chat relay
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: UUID-based unique session identifier
//! - `Username`: validated, lowercase identity chosen at handshake
//! - `RoomName`: validated, uppercase room key

use uuid::Uuid;

pub const MIN_USERNAME_LENGTH: usize = 5;
pub const MAX_USERNAME_LENGTH: usize = 8;

pub const MIN_ROOM_NAME_LENGTH: usize = 5;
pub const MAX_ROOM_NAME_LENGTH: usize = 20;

/// Unique session identifier (newtype pattern)
///
/// Usernames are only unique inside one room, so the room keys its
/// membership by this id instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_name_charset(input: &str) -> bool {
    !input.is_empty()
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check a raw username (5-8 characters, A-Z, a-z, 0-9, _)
pub fn is_valid_username(input: &str) -> bool {
    (MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&input.len()) && is_name_charset(input)
}

/// Check a raw room name (5-20 characters, A-Z, a-z, 0-9, _)
pub fn is_valid_room_name(input: &str) -> bool {
    (MIN_ROOM_NAME_LENGTH..=MAX_ROOM_NAME_LENGTH).contains(&input.len()) && is_name_charset(input)
}

/// Username (lowercase)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Validate and normalize user input
    ///
    /// Surrounding whitespace is ignored. Returns None if the name is invalid.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        is_valid_username(input).then(|| Self(input.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room name (uppercase)
///
/// Used as the registry key. Parsed from user input during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomName(String);

impl RoomName {
    /// Validate and normalize user input (converts to uppercase)
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        is_valid_room_name(input).then(|| Self(input.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
