//! Session binding: derives the active conversation key from the identity
//! context and the selected peer, and drives channel subscription, backlog
//! fetching, and the reconciler from one event loop.
//!
//! All three message sources funnel into the single `tokio::select!` loop
//! here, so reconciler state transitions are serialized without locking.

use crate::channel::{ChannelConfig, ChannelStatus, ChannelTransport, LiveChannel, LiveChannelHandle};
use crate::history::{HistoryError, HistoryStore};
use crate::reconciler::{Admission, ConversationView, Reconciler};
use crate::{SessionKey, SyncError};
use pairchat_protocol::wire::{ClientFrame, ServerFrame};
use pairchat_protocol::{ConversationKey, HistoryRecord, ParticipantId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

type HistoryOutcome = (ConversationKey, Result<Vec<HistoryRecord>, HistoryError>);

enum Command {
    SetPeer(Option<ParticipantId>),
    Send {
        body: String,
        result: oneshot::Sender<Result<(), SyncError>>,
    },
    Shutdown,
}

/// The presentation-facing surface: the live view, channel status, a send
/// entry point, and peer selection. No other mutation surface exists.
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    view_rx: watch::Receiver<ConversationView>,
    status_rx: watch::Receiver<ChannelStatus>,
}

impl SessionHandle {
    /// Choose (or clear) the conversation counterpart.
    pub fn set_peer(&self, peer: Option<ParticipantId>) -> Result<(), SyncError> {
        self.command_tx
            .send(Command::SetPeer(peer))
            .map_err(|_| SyncError::ChannelDisconnected)
    }

    /// Send a message in the active conversation. The optimistic append has
    /// already happened by the time this resolves; rejection means nothing
    /// was appended or transmitted.
    pub async fn send(&self, body: impl Into<String>) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send {
                body: body.into(),
                result: tx,
            })
            .map_err(|_| SyncError::ChannelDisconnected)?;
        rx.await.map_err(|_| SyncError::ChannelDisconnected)?
    }

    /// The authoritative ordered view, updated after every admission.
    pub fn view(&self) -> watch::Receiver<ConversationView> {
        self.view_rx.clone()
    }

    /// Live channel status indicator.
    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_rx.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown);
    }
}

/// The session event loop. Owns the reconciler, the channel handle, and the
/// in-flight backlog-fetch bookkeeping.
pub struct ChatSession<H: HistoryStore> {
    history: Arc<H>,
    identity_rx: watch::Receiver<Option<ParticipantId>>,
    identity_alive: bool,
    peer: Option<ParticipantId>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    channel: LiveChannelHandle,
    inbound_rx: mpsc::UnboundedReceiver<ServerFrame>,
    channel_alive: bool,
    history_tx: mpsc::UnboundedSender<HistoryOutcome>,
    history_rx: mpsc::UnboundedReceiver<HistoryOutcome>,
    in_flight: HashSet<ConversationKey>,
    reconciler: Reconciler,
    view_tx: watch::Sender<ConversationView>,
}

impl<H: HistoryStore> ChatSession<H> {
    /// Wire up the channel and session tasks and hand back the handle.
    pub fn spawn<T: ChannelTransport>(
        transport: T,
        history: H,
        identity_rx: watch::Receiver<Option<ParticipantId>>,
        config: ChannelConfig,
    ) -> SessionHandle {
        let (channel, channel_handle, inbound_rx, status_rx) = LiveChannel::new(transport, config);
        tokio::spawn(channel.run());

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ConversationView::default());
        let (history_tx, history_rx) = mpsc::unbounded_channel();

        let session = ChatSession {
            history: Arc::new(history),
            identity_rx,
            identity_alive: true,
            peer: None,
            command_rx,
            channel: channel_handle,
            inbound_rx,
            channel_alive: true,
            history_tx,
            history_rx,
            in_flight: HashSet::new(),
            reconciler: Reconciler::new(),
            view_tx,
        };
        tokio::spawn(session.run());

        SessionHandle {
            command_tx,
            view_rx,
            status_rx,
        }
    }

    async fn run(mut self) {
        self.rebind();
        loop {
            tokio::select! {
                changed = self.identity_rx.changed(), if self.identity_alive => {
                    if changed.is_err() {
                        // Identity provider went away: treat as signed out.
                        self.identity_alive = false;
                    }
                    self.rebind();
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(Command::SetPeer(peer)) => {
                        self.peer = peer;
                        self.rebind();
                    }
                    Some(Command::Send { body, result }) => {
                        let _ = result.send(self.handle_send(&body));
                    }
                    Some(Command::Shutdown) | None => break,
                },
                inbound = self.inbound_rx.recv(), if self.channel_alive => match inbound {
                    Some(frame) => self.handle_inbound(frame),
                    None => {
                        warn!("live channel task terminated");
                        self.channel_alive = false;
                    }
                },
                Some((key, outcome)) = self.history_rx.recv() => {
                    self.handle_history(key, outcome);
                }
            }
        }
    }

    fn current_identity(&self) -> Option<ParticipantId> {
        if self.identity_alive {
            self.identity_rx.borrow().clone()
        } else {
            None
        }
    }

    /// Recompute the conversation key and, if it changed, drive the channel
    /// and history lifecycles. Recomputing the same key is a no-op.
    fn rebind(&mut self) {
        let key = match (self.current_identity(), self.peer.clone()) {
            (Some(self_id), Some(peer)) => SessionKey::new(self_id, peer),
            _ => None,
        };
        if key.as_ref() == self.reconciler.active_key() {
            return;
        }

        match &key {
            Some(bound) => {
                debug!(key = %bound.conversation_key(), "binding conversation");
                if let Err(err) = self.channel.bind(bound.clone()) {
                    warn!(%err, "channel bind failed");
                }
                self.reconciler.reset(Some(bound.clone()));
                self.start_history_fetch(bound.conversation_key().clone());
            }
            None => {
                debug!("conversation unbound");
                if let Err(err) = self.channel.unbind() {
                    warn!(%err, "channel unbind failed");
                }
                self.reconciler.reset(None);
            }
        }
        self.publish_view();
    }

    /// At most one concurrent backlog call per key.
    fn start_history_fetch(&mut self, key: ConversationKey) {
        if !self.in_flight.insert(key.clone()) {
            return;
        }
        let store = Arc::clone(&self.history);
        let tx = self.history_tx.clone();
        tokio::spawn(async move {
            let outcome = store.backlog(&key).await;
            let _ = tx.send((key, outcome));
        });
    }

    fn handle_send(&mut self, body: &str) -> Result<(), SyncError> {
        // An identity or peer change may still be queued behind this command;
        // recompute the binding so the send never uses a stale key.
        self.rebind();
        if self.current_identity().is_none() {
            return Err(SyncError::AuthRequired);
        }
        let message = self.reconciler.send_local(body)?;
        self.publish_view();

        let frame = ClientFrame::Send {
            sender: message.sender,
            receiver: message.receiver,
            body: message.body,
        };
        // The optimistic entry stays even if the channel task is gone; the
        // failure surfaces through the status watch.
        if let Err(err) = self.channel.send(frame) {
            warn!(%err, "channel send failed");
        }
        Ok(())
    }

    fn handle_inbound(&mut self, frame: ServerFrame) {
        let ServerFrame::Receive {
            sender,
            receiver,
            body,
        } = frame;
        match self.reconciler.admit_remote(sender, receiver, body) {
            Admission::Appended | Admission::Confirmed => self.publish_view(),
            Admission::Discarded => debug!("inbound message discarded by admission filter"),
        }
    }

    fn handle_history(&mut self, key: ConversationKey, outcome: Result<Vec<HistoryRecord>, HistoryError>) {
        self.in_flight.remove(&key);
        match outcome {
            Ok(records) => {
                let admitted = self.reconciler.merge_history(&key, records);
                debug!(%key, admitted, "backlog merged");
                if admitted > 0 {
                    self.publish_view();
                }
            }
            // Non-fatal: the conversation proceeds with an empty backlog.
            Err(err) => {
                let err = SyncError::HistoryFetchFailed(err.to_string());
                warn!(%key, %err, "backlog fetch failed");
            }
        }
    }

    fn publish_view(&self) {
        let _ = self.view_tx.send(self.reconciler.view());
    }
}
