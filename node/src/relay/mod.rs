//! Live relay: routes pushed messages between the two sides of a
//! conversation over framed TCP connections.
//!
//! A connection announces itself with `Join`, which places it in the sorted
//! room for the pair; every `Send` is persisted and then broadcast to all
//! room members, including the sender, whose client deduplicates the echo.

mod rooms;

pub use rooms::RoomRegistry;

use crate::state::AppState;
use pairchat_protocol::wire::{read_frame, write_frame, ClientFrame, ServerFrame};
use pairchat_protocol::{ChatMessage, ConversationKey, HistoryRecord, MessageOrigin};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("protocol error: {0}")]
    Protocol(#[from] pairchat_protocol::ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;

/// Accept relay connections until the listener fails.
pub async fn run(listener: TcpListener, state: Arc<AppState>) -> RelayResult<()> {
    info!(addr = %listener.local_addr()?, "relay listening");
    loop {
        let (stream, addr) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            match handle_connection(stream, state).await {
                Ok(()) => debug!(%addr, "relay connection closed"),
                Err(err) => debug!(%addr, %err, "relay connection ended"),
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<AppState>) -> RelayResult<()> {
    let (mut read, mut write) = stream.into_split();

    // Outbound frames funnel through one writer task per connection.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = write_frame(&mut write, &frame).await {
                debug!(%err, "relay write failed");
                break;
            }
        }
    });

    let mut membership: Option<(String, Uuid)> = None;
    let result = serve_frames(&mut read, &tx, &state, &mut membership).await;

    if let Some((room, id)) = membership {
        state.rooms().leave(&room, id).await;
    }
    drop(tx);
    let _ = writer.await;
    result
}

async fn serve_frames(
    read: &mut tokio::net::tcp::OwnedReadHalf,
    tx: &mpsc::UnboundedSender<ServerFrame>,
    state: &Arc<AppState>,
    membership: &mut Option<(String, Uuid)>,
) -> RelayResult<()> {
    loop {
        let Some(frame) = read_frame::<_, ClientFrame>(read).await? else {
            return Ok(());
        };
        match frame {
            ClientFrame::Join { sender, receiver } => {
                let Ok(key) = ConversationKey::new(sender, receiver) else {
                    debug!("ignoring malformed join");
                    continue;
                };
                let room = key.room_id();
                // A connection subscribes to one room at a time; a new join
                // moves it.
                if let Some((old_room, id)) = membership.take() {
                    state.rooms().leave(&old_room, id).await;
                }
                let id = state.rooms().join(&room, tx.clone()).await;
                debug!(%room, "relay member joined");
                *membership = Some((room, id));
            }
            ClientFrame::Send {
                sender,
                receiver,
                body,
            } => {
                let Ok(message) =
                    ChatMessage::new(sender, receiver, body, MessageOrigin::Remote, None)
                else {
                    debug!("ignoring malformed send");
                    continue;
                };
                let room = message.conversation_key().room_id();
                let record = HistoryRecord {
                    sender: message.sender.clone(),
                    receiver: message.receiver.clone(),
                    body: message.body.clone(),
                };
                if let Err(err) = state.store().append(&room, &record) {
                    // Delivery still proceeds; the backlog just loses a row.
                    warn!(%err, %room, "failed to persist message");
                }
                let delivered = state
                    .rooms()
                    .broadcast(
                        &room,
                        &ServerFrame::Receive {
                            sender: message.sender,
                            receiver: message.receiver,
                            body: message.body,
                        },
                    )
                    .await;
                debug!(%room, delivered, "message relayed");
            }
        }
    }
}
