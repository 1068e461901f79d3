//! TCP connection handler
//!
//! Handles individual client connections: the username/room handshake,
//! joining the room and running the session loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::client::{flush_rejection, read_line, Client};
use crate::error::AppError;
use crate::server::Server;
use crate::types::{RoomName, Username};

const LOGO: &str = r#"
 ____                        ____ _           _
|  _ \ ___   ___  _ __ ___  / ___| |__   __ _| |_
| |_) / _ \ / _ \| '_ ` _ \| |   | '_ \ / _` | __|
|  _ < (_) | (_) | | | | | | |___| | | | (_| | |_
|_| \_\___/ \___/|_| |_| |_|\____|_| |_|\__,_|\__|
"#;

const WELCOME_LINES: [&str; 3] = [
    "🚀 Get ready for an awesome chat experience! 🚀\n",
    "💡 Broadcasting Live: Join the fun! 🎤 💡\n",
    "👉 To get started, please enter your username. 👈\n",
];

const INVALID_USERNAME: &str = "❌ Invalid username. Must be 5-8 characters (A-Z, a-z, 0-9, _).\n";
const INVALID_ROOM_NAME: &str = "❌ Invalid room name. Must be 5-20 characters (A-Z, a-z, 0-9, _).\n";

/// Handle a new TCP connection
///
/// Runs the handshake, joins the requested room and serves the session
/// until it ends. Errors only concern this connection.
pub async fn handle_connection(stream: TcpStream, server: Arc<Server>) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let (username, room_name) = tokio::select! {
        result = handshake(&mut reader, &mut write_half, server.config().greeting_delay) => result?,
        _ = server.shutdown_requested() => return Err(AppError::ShuttingDown),
    };
    info!("{} from {} asked for room {}", username, peer_addr, room_name);

    let room = server.get_or_create_room(&room_name).await?;
    let client = Arc::new(Client::new(username, room.clone()));
    let (mailbox_tx, mailbox) = mpsc::channel(server.config().mailbox_capacity);

    if let Err(e) = room.join(client.member(mailbox_tx)).await {
        if matches!(e, AppError::RoomClosed(_)) {
            write_half.write_all(e.notice().as_bytes()).await?;
        }
        flush_rejection(mailbox, write_half).await?;
        return Err(e);
    }

    client.run(reader, write_half, mailbox).await;
    debug!("Connection from {} finished", peer_addr);
    Ok(())
}

/// Greet the client and ask for a username and a room
///
/// Re-prompts until each answer passes validation. Returns the lowercase
/// username and uppercase room name.
pub async fn handshake<R, W>(
    reader: &mut R,
    writer: &mut W,
    greeting_delay: Duration,
) -> Result<(Username, RoomName), AppError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    send_welcome(writer, greeting_delay).await?;

    let username = ask(
        reader,
        writer,
        "username",
        "Enter username: ",
        INVALID_USERNAME,
        Username::parse,
    )
    .await?;
    let room = ask(
        reader,
        writer,
        "room name",
        "Enter room name: ",
        INVALID_ROOM_NAME,
        RoomName::parse,
    )
    .await?;

    Ok((username, room))
}

async fn send_welcome<W>(writer: &mut W, delay: Duration) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    const STAGE: &str = "greeting";

    writer
        .write_all(LOGO.as_bytes())
        .await
        .map_err(handshake_error(STAGE))?;
    for line in WELCOME_LINES {
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(handshake_error(STAGE))?;
        writer.flush().await.map_err(handshake_error(STAGE))?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    Ok(())
}

async fn ask<R, W, T>(
    reader: &mut R,
    writer: &mut W,
    stage: &'static str,
    prompt: &str,
    invalid: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, AppError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::new();
    loop {
        writer
            .write_all(prompt.as_bytes())
            .await
            .map_err(handshake_error(stage))?;
        writer.flush().await.map_err(handshake_error(stage))?;

        line.clear();
        let read = read_line(reader, &mut line)
            .await
            .map_err(handshake_error(stage))?;
        if read == 0 {
            return Err(AppError::disconnected(stage));
        }

        if let Some(value) = parse(&String::from_utf8_lossy(&line)) {
            return Ok(value);
        }
        writer
            .write_all(invalid.as_bytes())
            .await
            .map_err(handshake_error(stage))?;
    }
}

fn handshake_error(stage: &'static str) -> impl FnOnce(std::io::Error) -> AppError {
    move |e| AppError::Handshake {
        stage,
        source: Some(e),
    }
}
