//! Test doubles for driving the synchronization core without a network:
//! a scripted wire whose connection epochs can be inspected and severed,
//! and in-memory history stores with controllable latency and failure.

use async_trait::async_trait;
use pairchat_protocol::wire::{ClientFrame, ServerFrame};
use pairchat_protocol::{ConversationKey, HistoryRecord};
use pairchat_sync::{
    ChannelError, ChannelResult, ChannelSink, ChannelStream, ChannelTransport, HistoryError,
    HistoryStore,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

struct Epoch {
    sent: Arc<Mutex<Vec<ClientFrame>>>,
    push: Option<mpsc::UnboundedSender<ServerFrame>>,
}

/// A wire whose every connection epoch is recorded: outbound frames can be
/// inspected, inbound frames injected, and the connection severed.
#[derive(Clone, Default)]
pub struct ScriptedWire {
    epochs: Arc<Mutex<Vec<Epoch>>>,
}

impl ScriptedWire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch_count(&self) -> usize {
        self.epochs.lock().unwrap().len()
    }

    /// Outbound frames recorded for one epoch.
    pub fn sent(&self, epoch: usize) -> Vec<ClientFrame> {
        self.epochs.lock().unwrap()[epoch].sent.lock().unwrap().clone()
    }

    /// Inject an inbound frame on an epoch. Returns false if that epoch was
    /// already severed.
    pub fn push(&self, epoch: usize, frame: ServerFrame) -> bool {
        let epochs = self.epochs.lock().unwrap();
        match &epochs[epoch].push {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Sever an epoch's inbound stream, as a dropped transport would.
    pub fn sever(&self, epoch: usize) {
        self.epochs.lock().unwrap()[epoch].push = None;
    }

    /// Wait until at least `count` epochs have been established.
    pub async fn wait_for_epochs(&self, count: usize) {
        while self.epoch_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until an epoch has recorded at least `count` outbound frames.
    pub async fn wait_for_sent(&self, epoch: usize, count: usize) {
        loop {
            {
                let epochs = self.epochs.lock().unwrap();
                if epochs.len() > epoch && epochs[epoch].sent.lock().unwrap().len() >= count {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub struct WireSink {
    sent: Arc<Mutex<Vec<ClientFrame>>>,
}

#[async_trait]
impl ChannelSink for WireSink {
    async fn send(&mut self, frame: ClientFrame) -> ChannelResult<()> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }
}

pub struct WireStream {
    rx: mpsc::UnboundedReceiver<ServerFrame>,
}

#[async_trait]
impl ChannelStream for WireStream {
    async fn recv(&mut self) -> ChannelResult<Option<ServerFrame>> {
        Ok(self.rx.recv().await)
    }
}

#[async_trait]
impl ChannelTransport for ScriptedWire {
    type Tx = WireSink;
    type Rx = WireStream;

    async fn connect(&self) -> ChannelResult<(Self::Tx, Self::Rx)> {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let (push, rx) = mpsc::unbounded_channel();
        self.epochs.lock().unwrap().push(Epoch {
            sent: Arc::clone(&sent),
            push: Some(push),
        });
        Ok((WireSink { sent }, WireStream { rx }))
    }
}

/// In-memory backlog store. Fetches for a held key block until released,
/// which makes "history resolves after the key changed" scenarios
/// deterministic.
#[derive(Clone, Default)]
pub struct MemoryHistory {
    backlogs: Arc<Mutex<HashMap<String, Vec<HistoryRecord>>>>,
    held: Arc<Mutex<HashSet<String>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &ConversationKey, records: Vec<HistoryRecord>) {
        self.backlogs
            .lock()
            .unwrap()
            .insert(key.room_id(), records);
    }

    /// Make fetches for `key` block until [`MemoryHistory::release`].
    pub fn hold(&self, key: &ConversationKey) {
        self.held.lock().unwrap().insert(key.room_id());
    }

    pub fn release(&self, key: &ConversationKey) {
        self.held.lock().unwrap().remove(&key.room_id());
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn backlog(&self, key: &ConversationKey) -> Result<Vec<HistoryRecord>, HistoryError> {
        let room = key.room_id();
        while self.held.lock().unwrap().contains(&room) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(self
            .backlogs
            .lock()
            .unwrap()
            .get(&room)
            .cloned()
            .unwrap_or_default())
    }
}

/// A backlog store that always fails; the conversation must stay usable.
#[derive(Clone, Default)]
pub struct FailingHistory;

#[async_trait]
impl HistoryStore for FailingHistory {
    async fn backlog(&self, _key: &ConversationKey) -> Result<Vec<HistoryRecord>, HistoryError> {
        Err(HistoryError("backlog unavailable".into()))
    }
}

/// A transport that never connects; used where the wire must stay down.
#[derive(Clone, Default)]
pub struct DeadWire;

#[async_trait]
impl ChannelTransport for DeadWire {
    type Tx = WireSink;
    type Rx = WireStream;

    async fn connect(&self) -> ChannelResult<(Self::Tx, Self::Rx)> {
        Err(ChannelError::Connect("wire is down".into()))
    }
}

/// Convenience for building backlog rows.
pub fn record(sender: &str, receiver: &str, body: &str) -> HistoryRecord {
    HistoryRecord {
        sender: sender.into(),
        receiver: receiver.into(),
        body: body.into(),
    }
}
