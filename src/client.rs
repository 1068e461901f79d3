//! Client session
//!
//! One joined connection. The read loop turns input lines into messages for
//! the room; the write loop drains the mailbox the room fills. Either loop
//! may end the session, and `close` makes sure that happens only once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::color;
use crate::config::MAX_LINE_LENGTH;
use crate::error::AppError;
use crate::message::{Frame, Message};
use crate::room::{Member, RoomHandle};
use crate::types::{SessionId, Username};

/// A session joined to a room
#[derive(Debug)]
pub struct Client {
    pub id: SessionId,
    pub username: Username,
    room: RoomHandle,
    prompt: String,
    closed: AtomicBool,
    cancel: Arc<watch::Sender<bool>>,
}

impl Client {
    pub fn new(username: Username, room: RoomHandle) -> Self {
        let prompt = color::prompt(room.color(), username.as_str(), room.name().as_str());
        let (cancel, _) = watch::channel(false);
        Self {
            id: SessionId::new(),
            username,
            room,
            prompt,
            closed: AtomicBool::new(false),
            cancel: Arc::new(cancel),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Membership record handed to the room on join
    pub fn member(&self, mailbox: mpsc::Sender<Frame>) -> Member {
        Member {
            id: self.id,
            username: self.username.clone(),
            mailbox,
            cancel: Arc::clone(&self.cancel),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run both loops until the session ends
    pub async fn run<R, W>(self: Arc<Self>, reader: R, writer: W, mailbox: mpsc::Receiver<Frame>)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let read_task = tokio::spawn(Arc::clone(&self).read_loop(reader));
        let write_task = tokio::spawn(Arc::clone(&self).write_loop(mailbox, writer));

        let (read, write) = tokio::join!(read_task, write_task);
        if let Err(e) = read {
            error!("Read task for {} failed: {}", self.username, e);
        }
        if let Err(e) = write {
            error!("Write task for {} failed: {}", self.username, e);
        }
        // A panicking loop never reached close
        self.close().await;
    }

    /// Connection → room
    pub async fn read_loop<R>(self: Arc<Self>, mut reader: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut cancel = self.cancel.subscribe();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break,
                read = read_line(&mut reader, &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!("{} closed the connection", self.username);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("🚨 Read error for {}: {}", self.username, AppError::Transport(e));
                    break;
                }
            }

            let line = String::from_utf8_lossy(&buf);
            let content = line.trim();
            if content.is_empty() {
                continue;
            }

            let frame = Message::user(content, self.username.as_str()).encode();
            if let Err(e) = self.room.forward(frame).await {
                debug!("Ending read loop for {}: {}", self.username, e);
                break;
            }
        }

        self.close().await;
    }

    /// Mailbox → connection
    ///
    /// Drains the mailbox once the room closes it. Exits at once, without
    /// draining, when the session is cancelled.
    pub async fn write_loop<W>(self: Arc<Self>, mut mailbox: mpsc::Receiver<Frame>, mut writer: W)
    where
        W: AsyncWrite + Unpin,
    {
        let mut cancel = self.cancel.subscribe();

        loop {
            let frame = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break,
                frame = mailbox.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let message = match Message::decode(&frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!("❌ Failed to parse message for {}: {}", self.username, e);
                    continue;
                }
            };

            if let Err(e) = self.write_message(&mut writer, &message).await {
                warn!("🚨 Write error for {}: {}", self.username, AppError::Transport(e));
                break;
            }
        }

        let _ = writer.shutdown().await;
        self.close().await;
    }

    async fn write_message<W>(&self, writer: &mut W, message: &Message) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        // Our own line came back from the room: just prompt again
        if message.sender != self.username.as_str() {
            writer.write_all(message.render().as_bytes()).await?;
        }
        writer.write_all(self.prompt.as_bytes()).await?;
        writer.flush().await
    }

    /// End the session
    ///
    /// Only the first call does anything: it stops both loops, which drops
    /// the connection halves, and tells the room this session left.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.send_replace(true);
        self.room.leave(self.id).await;
        info!("{} left {}", self.username, self.room.name());
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

/// Read one line of at most `MAX_LINE_LENGTH` bytes plus its newline
///
/// A longer line is an `InvalidData` error; the rest of it stays unread.
pub async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let start = buf.len();
    let limit = (MAX_LINE_LENGTH + 1) as u64;
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read > MAX_LINE_LENGTH && buf.last() != Some(&b'\n') {
        buf.truncate(start);
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("line longer than {} bytes", MAX_LINE_LENGTH),
        ));
    }
    Ok(read)
}

/// Write out whatever the room queued for a rejected session
///
/// The room closes the mailbox when it refuses a join, so this ends once the
/// notices are written.
pub async fn flush_rejection<W>(mut mailbox: mpsc::Receiver<Frame>, mut writer: W) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = mailbox.recv().await {
        match Message::decode(&frame) {
            Ok(message) => writer.write_all(message.content.as_bytes()).await?,
            Err(e) => warn!("❌ Failed to parse notice: {}", e),
        }
    }
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}
