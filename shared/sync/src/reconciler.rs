//! Conversation reconciler: merges optimistic local sends, the fetched
//! backlog, and live pushes into one ordered, duplicate-free view.
//!
//! The reconciler is a pure state machine with no IO and no clocks. All mutation
//! happens from the session event loop, so no locking is needed. Display
//! order is admission order: the transport provides no causal clock, so the
//! view never re-sorts by timestamp.

use crate::{SessionKey, SyncError};
use pairchat_protocol::{
    ChatMessage, ConversationKey, HistoryRecord, MessageOrigin, ParticipantId,
};
use std::collections::VecDeque;

/// Whether a view row was authored by us or by the counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayRole {
    Own,
    Other,
}

/// One row of the conversation view, ready for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayedMessage {
    pub sender: ParticipantId,
    pub body: String,
    pub role: DisplayRole,
    pub origin: MessageOrigin,
    /// For Local rows: whether the live echo has come back.
    pub confirmed: bool,
}

/// Snapshot of the ordered view for the active conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationView {
    pub messages: Vec<DisplayedMessage>,
}

impl ConversationView {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Outcome of offering an inbound message to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Appended as a new visible row.
    Appended,
    /// Recognized as the echo of a pending local send; no new row.
    Confirmed,
    /// Dropped by the admission filter or malformed.
    Discarded,
}

#[derive(Debug)]
struct Entry {
    message: ChatMessage,
    confirmed: bool,
}

#[derive(Debug)]
struct PendingSend {
    client_seq: u64,
    body: String,
}

/// The single owner of the conversation view and the pending-send set.
#[derive(Debug, Default)]
pub struct Reconciler {
    key: Option<SessionKey>,
    entries: Vec<Entry>,
    pending: VecDeque<PendingSend>,
    next_seq: u64,
    history_applied: bool,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_key(&self) -> Option<&SessionKey> {
        self.key.as_ref()
    }

    /// Discard the view and pending set and start empty for `key`.
    ///
    /// The local sequence counter is not reset; it stays monotonic for the
    /// lifetime of the reconciler.
    pub fn reset(&mut self, key: Option<SessionKey>) {
        self.key = key;
        self.entries.clear();
        self.pending.clear();
        self.history_applied = false;
    }

    /// Admit a user-issued send: validate, append optimistically, and return
    /// the message for transmission.
    pub fn send_local(&mut self, body: &str) -> Result<ChatMessage, SyncError> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| SyncError::InvalidSend("no active conversation".into()))?;

        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(SyncError::InvalidSend("empty message body".into()));
        }

        let seq = self.next_seq;
        let message = ChatMessage::new(
            key.self_id().clone(),
            key.peer().clone(),
            trimmed,
            MessageOrigin::Local,
            Some(seq),
        )
        .map_err(|e| SyncError::InvalidSend(e.to_string()))?;
        self.next_seq += 1;

        self.pending.push_back(PendingSend {
            client_seq: seq,
            body: message.body.clone(),
        });
        self.entries.push(Entry {
            message: message.clone(),
            confirmed: false,
        });
        Ok(message)
    }

    /// Offer one live-channel push to the view.
    pub fn admit_remote(
        &mut self,
        sender: ParticipantId,
        receiver: ParticipantId,
        body: String,
    ) -> Admission {
        let Some(key) = self.key.as_ref() else {
            return Admission::Discarded;
        };
        let Ok(message) = ChatMessage::new(sender, receiver, body, MessageOrigin::Remote, None)
        else {
            return Admission::Discarded;
        };
        // Admission filter: stale-key messages die here.
        if &message.conversation_key() != key.conversation_key() {
            return Admission::Discarded;
        }

        // Self-echo: match the oldest unconfirmed pending send with the same
        // body (FIFO tie-break for duplicate bodies).
        if &message.sender == key.self_id() {
            if let Some(pos) = self.pending.iter().position(|p| p.body == message.body) {
                if let Some(pending) = self.pending.remove(pos) {
                    if let Some(entry) = self
                        .entries
                        .iter_mut()
                        .find(|e| e.message.client_seq == Some(pending.client_seq))
                    {
                        entry.confirmed = true;
                    }
                }
                return Admission::Confirmed;
            }
        }

        self.entries.push(Entry {
            message,
            confirmed: true,
        });
        Admission::Appended
    }

    /// Merge the fetched backlog for `key`. Applied at most once per key
    /// epoch; the batch lands before anything admitted during the fetch
    /// window, in backlog order. Returns the number of rows admitted.
    pub fn merge_history(&mut self, key: &ConversationKey, records: Vec<HistoryRecord>) -> usize {
        let Some(active) = self.key.as_ref() else {
            return 0;
        };
        // A fetch that resolves after the key changed is simply ignored.
        if active.conversation_key() != key {
            return 0;
        }
        if self.history_applied {
            return 0;
        }
        self.history_applied = true;

        let batch: Vec<Entry> = records
            .into_iter()
            .filter_map(|record| record.into_message().ok())
            .filter(|message| &message.conversation_key() == key)
            .map(|message| Entry {
                message,
                confirmed: true,
            })
            .collect();
        let admitted = batch.len();
        self.entries.splice(0..0, batch);
        admitted
    }

    /// Current snapshot for presentation.
    pub fn view(&self) -> ConversationView {
        let Some(key) = self.key.as_ref() else {
            return ConversationView::default();
        };
        let messages = self
            .entries
            .iter()
            .map(|entry| DisplayedMessage {
                sender: entry.message.sender.clone(),
                body: entry.message.body.clone(),
                role: if &entry.message.sender == key.self_id() {
                    DisplayRole::Own
                } else {
                    DisplayRole::Other
                },
                origin: entry.message.origin,
                confirmed: entry.confirmed,
            })
            .collect();
        ConversationView { messages }
    }

    /// Number of unconfirmed local sends awaiting their echo.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
