//! Message synchronization core for two-party conversations.
//!
//! Reconciles three independent message sources (locally-originated
//! optimistic sends, the fetched backlog, and the live push stream) into a
//! single ordered, duplicate-free conversation view that stays correct
//! across reconnects and out-of-order delivery.
//!
//! The pieces:
//! - [`channel::LiveChannel`]: one logical, continuously-reconnecting
//!   subscription bound to a conversation.
//! - [`reconciler::Reconciler`]: the state machine owning the view.
//! - [`session::ChatSession`]: the event loop binding identity and peer
//!   selection to channel subscriptions and backlog fetches.

pub mod channel;
pub mod history;
pub mod reconciler;
pub mod session;
pub mod tcp;

pub use channel::{
    ChannelConfig, ChannelError, ChannelResult, ChannelSink, ChannelStatus, ChannelStream,
    ChannelTransport, LiveChannel, LiveChannelHandle,
};
pub use history::{HistoryError, HistoryStore};
pub use reconciler::{Admission, ConversationView, DisplayRole, DisplayedMessage, Reconciler};
pub use session::{ChatSession, SessionHandle};

use pairchat_protocol::wire::ClientFrame;
use pairchat_protocol::{ConversationKey, ParticipantId};

/// Errors surfaced by the synchronization core.
///
/// Transport and fetch failures degrade to status and logging; none of these
/// tear down the session loop.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("not authenticated")]
    AuthRequired,
    #[error("invalid send: {0}")]
    InvalidSend(String),
    #[error("history fetch failed: {0}")]
    HistoryFetchFailed(String),
    /// The channel or session task is gone. Transient disconnects never
    /// produce this; they surface as [`ChannelStatus::Reconnecting`].
    #[error("live channel disconnected")]
    ChannelDisconnected,
}

/// Oriented view of an active conversation: who we are and who we talk to.
///
/// Construction validates the underlying unordered [`ConversationKey`], so a
/// value of this type always names a well-formed conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    self_id: ParticipantId,
    peer: ParticipantId,
    key: ConversationKey,
}

impl SessionKey {
    /// `None` unless both ids are non-empty and distinct.
    pub fn new(self_id: ParticipantId, peer: ParticipantId) -> Option<Self> {
        let key = ConversationKey::new(self_id.clone(), peer.clone()).ok()?;
        Some(Self { self_id, peer, key })
    }

    pub fn self_id(&self) -> &ParticipantId {
        &self.self_id
    }

    pub fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    pub fn conversation_key(&self) -> &ConversationKey {
        &self.key
    }

    /// The participation announcement for this binding.
    pub fn join_frame(&self) -> ClientFrame {
        ClientFrame::Join {
            sender: self.self_id.clone(),
            receiver: self.peer.clone(),
        }
    }
}
