//! Room registry and TCP server
//!
//! Accepts connections, hands each one to `handle_connection`, and keeps the
//! name → room map. Rooms are created lazily on first use and run as their
//! own actors; the registry only stores their handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::history::{FileHistory, History};
use crate::room::{Room, RoomHandle};
use crate::types::RoomName;

/// The chat relay server
pub struct Server {
    config: Config,
    /// All live rooms: RoomName -> RoomHandle
    rooms: RwLock<HashMap<RoomName, RoomHandle>>,
    history: Option<Arc<dyn History>>,
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
}

impl Server {
    /// Create a server; history files go to `config.history_dir` if set
    pub fn new(config: Config) -> Self {
        let history = config
            .history_dir
            .clone()
            .map(|dir| Arc::new(FileHistory::new(dir)) as Arc<dyn History>);
        Self::with_history(config, history)
    }

    pub fn with_history(config: Config, history: Option<Arc<dyn History>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            rooms: RwLock::new(HashMap::new()),
            history,
            shutdown,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind `config.addr` and serve until shutdown
    pub async fn run(self: Arc<Self>) -> Result<(), AppError> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown
    ///
    /// The listener is dropped, and so closed, when this returns.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), AppError> {
        let addr = listener.local_addr()?;
        info!("✅ Server started on {}", addr);

        loop {
            tokio::select! {
                _ = self.shutdown_requested() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("New connection from {}", peer);
                        let server = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, server).await {
                                log_connection_error(peer, &e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }

        info!("Stopped accepting connections on {}", addr);
        Ok(())
    }

    /// Find the room called `name`, starting it if needed
    pub async fn get_or_create_room(&self, name: &RoomName) -> Result<RoomHandle, AppError> {
        if let Some(room) = self.rooms.read().await.get(name) {
            return Ok(room.clone());
        }

        let mut rooms = self.rooms.write().await;
        if self.is_shutting_down() {
            return Err(AppError::ShuttingDown);
        }
        // Another connection may have created it while we waited
        if let Some(room) = rooms.get(name) {
            return Ok(room.clone());
        }

        let (room, handle) = Room::new(name.clone(), self.config.max_clients, self.history.clone());
        tokio::spawn(room.run());
        rooms.insert(name.clone(), handle.clone());
        info!("🏠 Room {} created.", name);
        Ok(handle)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once `shutdown` has been called
    pub async fn shutdown_requested(&self) {
        let mut stopping = self.shutdown.subscribe();
        let _ = stopping.wait_for(|stopping| *stopping).await;
    }

    /// Stop accepting connections and quit every room
    ///
    /// Only the first call has any effect.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("⚠️  Shutting down server...");
        self.shutdown.send_replace(true);

        let mut rooms = self.rooms.write().await;
        for (name, room) in rooms.drain() {
            debug!("Stopping room {}", name);
            room.quit();
        }
        info!("✅ Server shut down gracefully.");
    }
}

fn log_connection_error(peer: std::net::SocketAddr, e: &AppError) {
    match e {
        AppError::Handshake { .. } | AppError::ShuttingDown => {
            debug!("Connection from {} ended during setup: {}", peer, e)
        }
        AppError::CapacityExceeded { .. } | AppError::IdentityTaken { .. } => {
            info!("Refused {}: {}", peer, e)
        }
        _ => warn!("Connection handler error for {}: {}", peer, e),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn test_server() -> Arc<Server> {
        let config = Config {
            history_dir: None,
            ..Config::default()
        };
        Arc::new(Server::new(config))
    }

    fn room(name: &str) -> RoomName {
        RoomName::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_room() {
        let server = test_server();
        let first = server.get_or_create_room(&room("lobby")).await.unwrap();
        let second = server.get_or_create_room(&room("LOBBY")).await.unwrap();
        assert_eq!(first.name(), second.name());
        assert_eq!(first.color(), second.color());
        assert_eq!(server.room_count().await, 1);

        server.get_or_create_room(&room("games")).await.unwrap();
        assert_eq!(server.room_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_reference_creates_one_room() {
        let server = test_server();
        let lookups: Vec<_> = (0..16)
            .map(|_| {
                let server = Arc::clone(&server);
                tokio::spawn(async move { server.get_or_create_room(&room("lobby")).await })
            })
            .collect();
        for lookup in lookups {
            lookup.await.unwrap().unwrap();
        }
        assert_eq!(server.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_quits_rooms_and_refuses_new_ones() {
        let server = test_server();
        let lobby = server.get_or_create_room(&room("lobby")).await.unwrap();

        server.shutdown().await;
        server.shutdown().await;
        assert!(server.is_shutting_down());
        assert_eq!(server.room_count().await, 0);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !lobby.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(matches!(
            server.get_or_create_room(&room("lobby")).await,
            Err(AppError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_serve_returns_after_shutdown() {
        let server = test_server();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let task = tokio::spawn(Arc::clone(&server).serve(listener));

        server.shutdown().await;
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
