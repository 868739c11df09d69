//! Chat data model shared across PairChat clients and services.

pub mod wire;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier naming one side of a conversation.
///
/// Equality is exact-match; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unordered pair of distinct participants identifying one conversation.
///
/// Members are held in sorted order, so `new(a, b) == new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    lo: ParticipantId,
    hi: ParticipantId,
}

impl ConversationKey {
    /// Build a key from two participants. Rejects empty or identical members.
    pub fn new(a: ParticipantId, b: ParticipantId) -> Result<Self> {
        if a.is_empty() || b.is_empty() {
            return Err(ProtocolError::EmptyParticipant);
        }
        if a == b {
            return Err(ProtocolError::IdenticalParticipants);
        }
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Ok(Self { lo, hi })
    }

    pub fn members(&self) -> (&ParticipantId, &ParticipantId) {
        (&self.lo, &self.hi)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        &self.lo == id || &self.hi == id
    }

    /// Canonical routing label for this pair, used for relay rooms and
    /// storage prefixes. The separator cannot appear in well-formed ids,
    /// keeping the join unambiguous.
    pub fn room_id(&self) -> String {
        format!("{}|{}", self.lo, self.hi)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}}}", self.lo, self.hi)
    }
}

/// Which of the three sources a message entered the view from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageOrigin {
    /// Locally-originated optimistic send.
    Local,
    /// Delivered by the live channel.
    Remote,
    /// Part of the fetched backlog.
    Historical,
}

/// A single message between two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: ParticipantId,
    pub receiver: ParticipantId,
    pub body: String,
    pub origin: MessageOrigin,
    /// Monotonic per-session counter, assigned to Local messages only.
    pub client_seq: Option<u64>,
}

impl ChatMessage {
    /// Construct a validated message. The body is trimmed; empty bodies and
    /// self-addressed messages are rejected.
    pub fn new(
        sender: ParticipantId,
        receiver: ParticipantId,
        body: impl Into<String>,
        origin: MessageOrigin,
        client_seq: Option<u64>,
    ) -> Result<Self> {
        if sender.is_empty() || receiver.is_empty() {
            return Err(ProtocolError::EmptyParticipant);
        }
        if sender == receiver {
            return Err(ProtocolError::IdenticalParticipants);
        }
        let body = body.into().trim().to_owned();
        if body.is_empty() {
            return Err(ProtocolError::EmptyBody);
        }
        Ok(Self {
            sender,
            receiver,
            body,
            origin,
            client_seq,
        })
    }

    /// The unordered pair this message belongs to.
    pub fn conversation_key(&self) -> ConversationKey {
        // Invariants are enforced at construction, so ordering is all
        // that is left to do here.
        let (a, b) = (self.sender.clone(), self.receiver.clone());
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        ConversationKey { lo, hi }
    }
}

/// One backlog row as served by the history API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub sender: ParticipantId,
    pub receiver: ParticipantId,
    pub body: String,
}

impl HistoryRecord {
    /// Lift a stored row into a validated message tagged `Historical`.
    pub fn into_message(self) -> Result<ChatMessage> {
        ChatMessage::new(
            self.sender,
            self.receiver,
            self.body,
            MessageOrigin::Historical,
            None,
        )
    }
}

/// Protocol-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("participant identifier is empty")]
    EmptyParticipant,
    #[error("conversation requires two distinct participants")]
    IdenticalParticipants,
    #[error("message body is empty")]
    EmptyBody,
    #[error("frame exceeds {max} bytes: {actual}")]
    FrameTooLarge { actual: usize, max: usize },
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
