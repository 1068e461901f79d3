//! Room-based TCP Chat Relay Library
//!
//! A line-oriented chat server for plain terminal clients (`nc`, `telnet`)
//! built on tokio, using the Actor pattern for room state.
//!
//! # Features
//! - Username and room selection handshake
//! - Named rooms created on first use, up to 10 members each
//! - Real-time broadcast of every line to the rest of the room
//! - Join/leave notifications
//! - Per-room history log replayed to newcomers
//! - Slow clients evicted instead of stalling the room
//!
//! # Architecture
//! - Each `Room` is an actor that owns its membership and processes join,
//!   leave and forward commands one at a time
//! - Each session runs a read task (socket → room) and a write task
//!   (bounded mailbox → socket)
//! - The `Server` keeps a name → room map behind a read/write lock
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use roomchat::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Arc::new(Server::new(Config::default()));
//!     server.run().await.unwrap();
//! }
//! ```

pub mod client;
pub mod color;
pub mod config;
pub mod error;
pub mod handler;
pub mod history;
pub mod message;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use config::Config;
pub use error::AppError;
pub use handler::handle_connection;
pub use history::{FileHistory, History};
pub use message::{Frame, Message, MessageKind};
pub use room::{Room, RoomCommand, RoomHandle, RoomState};
pub use server::Server;
pub use types::{RoomName, SessionId, Username};
