//! Server configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default listening port
pub const DEFAULT_PORT: u16 = 11111;

/// Maximum members per room
pub const MAX_CLIENTS: usize = 10;

/// Pending outbound messages per session before it counts as unresponsive
pub const MAILBOX_CAPACITY: usize = 256;

/// Longest input line accepted from a client, newline excluded
pub const MAX_LINE_LENGTH: usize = 4096;

/// Runtime settings for `Server`
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on
    pub addr: String,
    /// Room capacity
    pub max_clients: usize,
    /// Per-session mailbox capacity
    pub mailbox_capacity: usize,
    /// Pause after each welcome line during the handshake
    pub greeting_delay: Duration,
    /// Directory for room history files; None disables history
    pub history_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            max_clients: MAX_CLIENTS,
            mailbox_capacity: MAILBOX_CAPACITY,
            greeting_delay: Duration::from_millis(200),
            history_dir: Some(PathBuf::from(".")),
        }
    }
}
