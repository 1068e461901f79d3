//! Room actor
//!
//! Each room runs its own control loop that owns the membership set. Sessions
//! reach it only through a `RoomHandle`, so joins, leaves and broadcasts are
//! processed one at a time in arrival order and no locks guard `members`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::color;
use crate::error::AppError;
use crate::history::History;
use crate::message::{Frame, Message};
use crate::types::{RoomName, SessionId, Username};

/// Channel buffer size for room commands
const COMMAND_BUFFER_SIZE: usize = 256;

/// A session as seen by the room
#[derive(Debug)]
pub struct Member {
    pub id: SessionId,
    pub username: Username,
    /// Room → session outbound queue. Dropping it closes the mailbox.
    pub mailbox: mpsc::Sender<Frame>,
    /// Ends the session's loops without draining the mailbox
    pub cancel: Arc<watch::Sender<bool>>,
}

/// Commands sent from sessions to the room actor
#[derive(Debug)]
pub enum RoomCommand {
    /// Admit a member; the outcome is sent back on `reply`
    Join {
        member: Member,
        reply: oneshot::Sender<Result<(), AppError>>,
    },
    /// Remove a member if it is still present
    Leave { id: SessionId },
    /// Broadcast an encoded message to every member
    Forward { frame: Frame },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Running,
    ShuttingDown,
}

/// Address of a running room
#[derive(Debug, Clone)]
pub struct RoomHandle {
    name: RoomName,
    color: &'static str,
    commands: mpsc::Sender<RoomCommand>,
    quit: Arc<watch::Sender<bool>>,
}

impl RoomHandle {
    pub fn name(&self) -> &RoomName {
        &self.name
    }

    pub fn color(&self) -> &'static str {
        self.color
    }

    /// Ask the room to admit `member`
    ///
    /// Resolves once the room has decided. On rejection the member's mailbox
    /// already holds a notice for the client and has been closed.
    pub async fn join(&self, member: Member) -> Result<(), AppError> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(RoomCommand::Join { member, reply })
            .await
            .map_err(|_| AppError::RoomClosed(self.name.clone()))?;
        outcome
            .await
            .map_err(|_| AppError::RoomClosed(self.name.clone()))?
    }

    /// Tell the room a session is gone. No-op if the room has stopped.
    pub async fn leave(&self, id: SessionId) {
        if self.commands.send(RoomCommand::Leave { id }).await.is_err() {
            debug!("Room {} already closed, dropping leave for {}", self.name, id);
        }
    }

    pub async fn forward(&self, frame: Frame) -> Result<(), AppError> {
        self.commands
            .send(RoomCommand::Forward { frame })
            .await
            .map_err(|_| AppError::RoomClosed(self.name.clone()))
    }

    /// Stop the room. Queued output to members is discarded.
    pub fn quit(&self) {
        self.quit.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Room control loop state
pub struct Room {
    name: RoomName,
    state: RoomState,
    members: HashMap<SessionId, Member>,
    max_clients: usize,
    history: Option<Arc<dyn History>>,
    receiver: mpsc::Receiver<RoomCommand>,
    quit: watch::Receiver<bool>,
}

impl Room {
    /// Create a room and the handle used to reach it
    ///
    /// The room does nothing until `run` is spawned.
    pub fn new(
        name: RoomName,
        max_clients: usize,
        history: Option<Arc<dyn History>>,
    ) -> (Self, RoomHandle) {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (quit_tx, quit) = watch::channel(false);
        let handle = RoomHandle {
            name: name.clone(),
            color: color::random_room_color(),
            commands,
            quit: Arc::new(quit_tx),
        };
        let room = Self {
            name,
            state: RoomState::Running,
            members: HashMap::new(),
            max_clients,
            history,
            receiver,
            quit,
        };
        (room, handle)
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    /// Pop a queued command without running the loop
    #[cfg(test)]
    pub(crate) fn try_next_command(
        &mut self,
    ) -> Result<RoomCommand, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Run the room event loop
    ///
    /// Returns after `quit`, or once every handle has been dropped.
    pub async fn run(mut self) {
        info!("🔄 Starting room {}", self.name);
        let mut quit = self.quit.clone();

        while self.state == RoomState::Running {
            tokio::select! {
                biased;
                _ = quit.changed() => self.shutdown(),
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => self.shutdown(),
                },
            }
        }

        info!("✅ Room {} shutdown complete", self.name);
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { member, reply } => {
                let outcome = self.handle_join(member);
                let _ = reply.send(outcome);
            }
            RoomCommand::Leave { id } => self.remove_member(id),
            RoomCommand::Forward { frame } => self.handle_forward(frame),
        }
    }

    fn handle_join(&mut self, member: Member) -> Result<(), AppError> {
        let rejection = if self.members.len() >= self.max_clients {
            Some(AppError::CapacityExceeded {
                room: self.name.clone(),
                max: self.max_clients,
            })
        } else if self.members.values().any(|m| m.username == member.username) {
            Some(AppError::IdentityTaken {
                room: self.name.clone(),
                username: member.username.clone(),
            })
        } else {
            None
        };

        if let Some(err) = rejection {
            info!("❌ {} cannot join {}: {}", member.username, self.name, err);
            let _ = member.mailbox.try_send(Message::notice(err.notice()).encode());
            return Err(err);
        }

        let id = member.id;
        let username = member.username.clone();
        // Ahead of the welcome; later forwards queue after it
        if let Some(replay) = self.history_replay() {
            let _ = member.mailbox.try_send(replay.encode());
        }
        let welcome = Message::notice(format!(
            "🏠 Joined room {} ({}/{} online)\n",
            self.name,
            self.members.len() + 1,
            self.max_clients
        ));
        let _ = member.mailbox.try_send(welcome.encode());
        self.members.insert(id, member);
        info!("✅ {} joined {} ({} members)", username, self.name, self.members.len());

        let joined = Message::notification(
            format!("📢 {} has joined the room.\n", username),
            username.as_str(),
        );
        let stale = self.deliver(&joined.encode(), Some(id));
        self.evict(stale);
        Ok(())
    }

    /// Stored transcript for a newcomer, if history is enabled
    fn history_replay(&self) -> Option<Message> {
        let history = self.history.as_ref()?;
        let text = match history.read_all(&self.name) {
            Ok(Some(log)) => format!("📜 Previous messages:\n{}", String::from_utf8_lossy(&log)),
            Ok(None) => "📭 No chat history available.\n".to_string(),
            Err(e) => {
                error!("❌ Error reading history for {}: {}", self.name, e);
                "❌ Failed to load chat history.\n".to_string()
            }
        };
        Some(Message::notice(text))
    }

    fn handle_forward(&mut self, frame: Frame) {
        let message = match Message::decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("❌ Dropping message in room {}: {}", self.name, e);
                return;
            }
        };

        if let Some(history) = &self.history {
            if let Err(e) = history.append(&self.name, message.history_record().as_bytes()) {
                error!("❌ Error saving message for {}: {}", self.name, e);
            }
        }

        let stale = self.deliver(&frame, None);
        self.evict(stale);
    }

    /// try_send `frame` to every member except `skip`
    ///
    /// Returns the members that could not take it.
    fn deliver(&self, frame: &Frame, skip: Option<SessionId>) -> Vec<SessionId> {
        let mut stale = Vec::new();
        for (id, member) in &self.members {
            if Some(*id) == skip {
                continue;
            }
            match member.mailbox.try_send(Frame::clone(frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let err = AppError::UnresponsiveConsumer {
                        username: member.username.clone(),
                    };
                    warn!("❌ Evicting from room {}: {}", self.name, err);
                    stale.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("{} mailbox closed in room {}", member.username, self.name);
                    stale.push(*id);
                }
            }
        }
        stale
    }

    fn remove_member(&mut self, id: SessionId) {
        self.evict(vec![id]);
    }

    /// Remove members and announce each departure
    ///
    /// Announcements can expose further full mailboxes, which are evicted in
    /// turn until none remain.
    fn evict(&mut self, mut pending: Vec<SessionId>) {
        while let Some(id) = pending.pop() {
            let Some(member) = self.members.remove(&id) else {
                continue;
            };
            let username = member.username;
            drop(member.mailbox);
            info!("✅ {} left {} ({} members)", username, self.name, self.members.len());

            let left = Message::notification(
                format!("📢 {} has left the room.\n", username),
                username.as_str(),
            );
            pending.extend(self.deliver(&left.encode(), None));
        }
    }

    fn shutdown(&mut self) {
        info!("🛑 Shutting down room {}", self.name);
        self.state = RoomState::ShuttingDown;
        for (_, member) in self.members.drain() {
            member.cancel.send_replace(true);
        }
        self.receiver.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use tokio::task::JoinHandle;

    use super::*;
    use crate::message::MessageKind;

    pub(crate) fn username(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    fn room_name(name: &str) -> RoomName {
        RoomName::parse(name).unwrap()
    }

    pub(crate) struct TestMember {
        pub id: SessionId,
        pub mailbox: mpsc::Receiver<Frame>,
        pub cancel: watch::Receiver<bool>,
    }

    pub(crate) fn member(name: &str, capacity: usize) -> (Member, TestMember) {
        let (tx, rx) = mpsc::channel(capacity);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let id = SessionId::new();
        let member = Member {
            id,
            username: username(name),
            mailbox: tx,
            cancel: Arc::new(cancel_tx),
        };
        (
            member,
            TestMember {
                id,
                mailbox: rx,
                cancel: cancel_rx,
            },
        )
    }

    fn spawn_room(max_clients: usize) -> (RoomHandle, JoinHandle<()>) {
        let (room, handle) = Room::new(room_name("lobby"), max_clients, None);
        (handle, tokio::spawn(room.run()))
    }

    /// Everything queued in a mailbox right now
    fn drain(mailbox: &mut mpsc::Receiver<Frame>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(frame) = mailbox.try_recv() {
            out.push(Message::decode(&frame).unwrap());
        }
        out
    }

    /// Round-trip a join so every earlier command has been processed
    async fn sync(room: &RoomHandle) {
        let (m, _t) = member("syncer", 8);
        room.join(m).await.unwrap();
    }

    #[tokio::test]
    async fn test_join_sends_welcome_and_announces() {
        let (room, _task) = spawn_room(10);
        let (alice, mut alice_rx) = member("alice", 8);
        let (bobby, mut bobby_rx) = member("bobby", 8);

        room.join(alice).await.unwrap();
        room.join(bobby).await.unwrap();

        let alice_msgs = drain(&mut alice_rx.mailbox);
        assert_eq!(alice_msgs.len(), 2);
        assert!(alice_msgs[0].content.contains("Joined room LOBBY (1/10 online)"));
        assert!(alice_msgs[0].sender.is_empty());
        assert_eq!(alice_msgs[1].content, "📢 bobby has joined the room.\n");
        assert_eq!(alice_msgs[1].kind, MessageKind::Notification);

        // No announcement of its own arrival
        let bobby_msgs = drain(&mut bobby_rx.mailbox);
        assert_eq!(bobby_msgs.len(), 1);
        assert!(bobby_msgs[0].content.contains("(2/10 online)"));
    }

    #[tokio::test]
    async fn test_eleventh_join_is_rejected() {
        let (room, _task) = spawn_room(10);
        let mut admitted = Vec::new();
        for i in 0..10 {
            let (m, t) = member(&format!("user{:02}", i), 64);
            room.join(m).await.unwrap();
            admitted.push(t);
        }

        let (late, mut late_rx) = member("user10", 8);
        let err = room.join(late).await.unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded { max: 10, .. }));

        // Notice queued, then the mailbox is closed
        let notice = late_rx.mailbox.recv().await.unwrap();
        let notice = Message::decode(&notice).unwrap();
        assert_eq!(notice.content, "❌ Room LOBBY is full. Cannot join.\n");
        assert!(late_rx.mailbox.recv().await.is_none());

        // Nobody heard about it
        for t in &mut admitted {
            let msgs = drain(&mut t.mailbox);
            assert!(msgs.iter().all(|m| !m.content.contains("user10")));
        }
    }

    #[tokio::test]
    async fn test_concurrent_joins_admit_exactly_ten() {
        let (room, _task) = spawn_room(10);
        let attempts: Vec<_> = (0..12)
            .map(|i| {
                let room = room.clone();
                tokio::spawn(async move {
                    let (m, t) = member(&format!("user{:02}", i), 64);
                    (room.join(m).await, t)
                })
            })
            .collect();

        let mut admitted = Vec::new();
        let mut rejected = Vec::new();
        for attempt in attempts {
            match attempt.await.unwrap() {
                (Ok(()), t) => admitted.push(t),
                (Err(AppError::CapacityExceeded { max: 10, .. }), t) => rejected.push(t),
                (Err(e), _) => panic!("unexpected join error: {}", e),
            }
        }
        assert_eq!(admitted.len(), 10);
        assert_eq!(rejected.len(), 2);

        for t in &mut rejected {
            let notice = Message::decode(&t.mailbox.recv().await.unwrap()).unwrap();
            assert!(notice.content.contains("is full"));
            assert!(t.mailbox.recv().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_is_rejected() {
        let (room, _task) = spawn_room(10);
        let (first, _first_rx) = member("alice", 8);
        let (second, mut second_rx) = member("alice", 8);

        room.join(first).await.unwrap();
        let err = room.join(second).await.unwrap_err();
        assert!(matches!(err, AppError::IdentityTaken { .. }));
        assert!(second_rx.mailbox.recv().await.is_some());
        assert!(second_rx.mailbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_forward_reaches_every_member() {
        let (room, _task) = spawn_room(10);
        let (alice, mut alice_rx) = member("alice", 8);
        let (bobby, mut bobby_rx) = member("bobby", 8);
        room.join(alice).await.unwrap();
        room.join(bobby).await.unwrap();
        drain(&mut alice_rx.mailbox);
        drain(&mut bobby_rx.mailbox);

        let msg = Message::user("hello", "alice");
        room.forward(msg.encode()).await.unwrap();
        sync(&room).await;

        // Delivered uniformly; self-suppression is the write loop's job
        for rx in [&mut alice_rx, &mut bobby_rx] {
            let msgs = drain(&mut rx.mailbox);
            assert_eq!(msgs[0], msg);
        }
    }

    #[tokio::test]
    async fn test_double_leave_announces_once() {
        let (room, _task) = spawn_room(10);
        let (alice, alice_rx) = member("alice", 8);
        let (bobby, mut bobby_rx) = member("bobby", 8);
        room.join(alice).await.unwrap();
        room.join(bobby).await.unwrap();
        drain(&mut bobby_rx.mailbox);

        room.leave(alice_rx.id).await;
        room.leave(alice_rx.id).await;
        sync(&room).await;

        let left: Vec<_> = drain(&mut bobby_rx.mailbox)
            .into_iter()
            .filter(|m| m.content.contains("has left"))
            .collect();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "📢 alice has left the room.\n");

        // Alice's mailbox was closed by the leave
        let mut alice_mailbox = alice_rx.mailbox;
        while alice_mailbox.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_full_mailbox_is_evicted() {
        let (room, _task) = spawn_room(10);
        let (alice, mut alice_rx) = member("alice", 16);
        // Room for the welcome only
        let (slow, mut slow_rx) = member("slowpoke", 1);
        room.join(alice).await.unwrap();
        room.join(slow).await.unwrap();

        room.forward(Message::user("hello", "alice").encode()).await.unwrap();
        room.forward(Message::user("again", "alice").encode()).await.unwrap();
        sync(&room).await;

        let contents: Vec<_> = drain(&mut alice_rx.mailbox)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert!(contents.contains(&"hello".to_string()));
        assert!(contents.contains(&"again".to_string()));
        assert!(contents.contains(&"📢 slowpoke has left the room.\n".to_string()));

        // Only the welcome made it, then the mailbox closed
        let welcome = Message::decode(&slow_rx.mailbox.recv().await.unwrap()).unwrap();
        assert!(welcome.content.contains("Joined room"));
        assert!(slow_rx.mailbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_forward_is_dropped() {
        let (room, _task) = spawn_room(10);
        let (alice, mut alice_rx) = member("alice", 8);
        room.join(alice).await.unwrap();
        drain(&mut alice_rx.mailbox);

        room.forward(Frame::from(&b"{not json"[..])).await.unwrap();
        room.forward(Message::user("still here", "bobby").encode())
            .await
            .unwrap();
        sync(&room).await;

        let msgs = drain(&mut alice_rx.mailbox);
        assert_eq!(msgs[0].content, "still here");
    }

    #[tokio::test]
    async fn test_forward_appends_history() {
        let dir = tempfile::tempdir().unwrap();
        let history: Arc<dyn History> = Arc::new(crate::history::FileHistory::new(dir.path()));
        let (room, handle) = Room::new(room_name("lobby"), 10, Some(Arc::clone(&history)));
        let _task = tokio::spawn(room.run());

        let msg = Message::user("remember me", "alice");
        handle.forward(msg.encode()).await.unwrap();
        sync(&handle).await;

        let log = history.read_all(&room_name("lobby")).unwrap().unwrap();
        assert_eq!(String::from_utf8(log).unwrap(), msg.history_record());
    }

    #[tokio::test]
    async fn test_join_replays_history_before_live_messages() {
        let dir = tempfile::tempdir().unwrap();
        let history: Arc<dyn History> = Arc::new(crate::history::FileHistory::new(dir.path()));
        let (room, handle) = Room::new(room_name("lobby"), 10, Some(history));
        let _task = tokio::spawn(room.run());

        let (alice, _alice_rx) = member("alice", 16);
        handle.join(alice).await.unwrap();
        handle.forward(Message::user("before", "alice").encode()).await.unwrap();

        let (bobby, mut bobby_rx) = member("bobby", 16);
        handle.join(bobby).await.unwrap();
        handle.forward(Message::user("between", "alice").encode()).await.unwrap();
        sync(&handle).await;

        let msgs = drain(&mut bobby_rx.mailbox);
        assert!(msgs[0].content.starts_with("📜 Previous messages:\n"));
        assert!(msgs[0].content.contains("alice 💬 before"));
        assert!(!msgs[0].content.contains("between"));
        assert!(msgs[1].content.contains("Joined room LOBBY"));

        let copies = msgs.iter().filter(|m| m.content.contains("between")).count();
        assert_eq!(copies, 1);
    }

    #[tokio::test]
    async fn test_join_without_history_log() {
        let dir = tempfile::tempdir().unwrap();
        let history: Arc<dyn History> = Arc::new(crate::history::FileHistory::new(dir.path()));
        let (room, handle) = Room::new(room_name("lobby"), 10, Some(history));
        let _task = tokio::spawn(room.run());

        let (alice, mut alice_rx) = member("alice", 16);
        handle.join(alice).await.unwrap();

        let msgs = drain(&mut alice_rx.mailbox);
        assert_eq!(msgs[0].content, "📭 No chat history available.\n");
        assert!(msgs[1].content.contains("Joined room"));
    }

    #[tokio::test]
    async fn test_quit_closes_members_and_stops() {
        let (room, task) = spawn_room(10);
        let (alice, mut alice_rx) = member("alice", 8);
        let (bobby, mut bobby_rx) = member("bobby", 8);
        room.join(alice).await.unwrap();
        room.join(bobby).await.unwrap();

        room.quit();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        for rx in [&mut alice_rx, &mut bobby_rx] {
            assert!(*rx.cancel.borrow());
            while rx.mailbox.recv().await.is_some() {}
        }

        assert!(room.is_closed());
        let (late, _) = member("carol", 8);
        assert!(matches!(room.join(late).await, Err(AppError::RoomClosed(_))));
        assert!(room.forward(Message::user("x", "y").encode()).await.is_err());
    }

    #[tokio::test]
    async fn test_room_stops_when_handles_dropped() {
        let (room, task) = spawn_room(10);
        drop(room);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_new_room_is_running() {
        let (room, handle) = Room::new(room_name("lobby"), 10, None);
        assert_eq!(room.state(), RoomState::Running);
        assert_eq!(handle.name().as_str(), "LOBBY");
        assert!(color::ROOM_COLORS.contains(&handle.color()));
    }
}
