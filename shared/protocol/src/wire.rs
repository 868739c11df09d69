//! Wire frames and framing for the live channel.
//!
//! Frames are length-prefixed JSON: a u32 big-endian byte count followed by
//! the serialized frame body.

use crate::{ParticipantId, ProtocolError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame body.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Frames sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Announce participation in the conversation so the relay can route
    /// subsequent pushes. Re-sent on every (re)connection.
    Join {
        sender: ParticipantId,
        receiver: ParticipantId,
    },
    /// One outbound message. Fire-and-forget; the relay does not reply.
    Send {
        sender: ParticipantId,
        receiver: ParticipantId,
        body: String,
    },
}

/// Frames pushed by the relay to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// One delivered message. The relay broadcasts to every room member,
    /// including the original sender (self-echo).
    Receive {
        sender: ParticipantId,
        receiver: ParticipantId,
        body: String,
    },
}

/// Write one length-prefixed frame.
pub async fn write_frame<W, T>(io: &mut W, frame: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json =
        serde_json::to_vec(frame).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
    if json.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            actual: json.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    io.write_all(&(json.len() as u32).to_be_bytes()).await?;
    io.write_all(&json).await?;
    io.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame. Resolves to `Ok(None)` on clean EOF at a
/// frame boundary.
pub async fn read_frame<R, T>(io: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    match io.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            actual: len,
            max: MAX_FRAME_BYTES,
        });
    }
    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    let frame =
        serde_json::from_slice(&buf).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
    Ok(Some(frame))
}
