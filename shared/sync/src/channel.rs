//! Live channel: one logical, continuously-reconnecting subscription bound
//! to a conversation key.
//!
//! The channel owns the physical connection lifecycle. On every
//! (re)establishment it announces participation for the binding current at
//! that moment, never the one active when the connection was lost. Inbound
//! frames are forwarded upstream exactly once per connection epoch; all
//! deduplication belongs to the reconciler.

use crate::SessionKey;
use async_trait::async_trait;
use pairchat_protocol::wire::{ClientFrame, ServerFrame};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Channel transport errors. Connection loss is recoverable and surfaces as
/// [`ChannelStatus::Reconnecting`], never as a session failure.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("channel task is gone")]
    Closed,
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Outbound half of one physical connection.
#[async_trait]
pub trait ChannelSink: Send + 'static {
    async fn send(&mut self, frame: ClientFrame) -> ChannelResult<()>;
}

/// Inbound half of one physical connection. `Ok(None)` means orderly close.
#[async_trait]
pub trait ChannelStream: Send + 'static {
    async fn recv(&mut self) -> ChannelResult<Option<ServerFrame>>;
}

/// Connection factory injected into the channel.
#[async_trait]
pub trait ChannelTransport: Send + Sync + 'static {
    type Tx: ChannelSink;
    type Rx: ChannelStream;

    async fn connect(&self) -> ChannelResult<(Self::Tx, Self::Rx)>;
}

/// Transient connection state, surfaced as a status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// No conversation bound.
    Idle,
    Connected,
    Reconnecting,
}

/// Tunables for reconnection and offline sends.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Queue outbound frames while disconnected (drained in order on
    /// reconnect). When false, offline sends are dropped with a warning.
    pub queue_outbound: bool,
    pub queue_limit: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            queue_outbound: true,
            queue_limit: 32,
        }
    }
}

#[derive(Debug)]
enum Command {
    Bind(SessionKey),
    Unbind,
    Send(ClientFrame),
}

/// Cloneable handle for driving the channel task.
#[derive(Clone)]
pub struct LiveChannelHandle {
    command_tx: mpsc::UnboundedSender<Command>,
}

impl LiveChannelHandle {
    pub fn bind(&self, key: SessionKey) -> ChannelResult<()> {
        self.command_tx
            .send(Command::Bind(key))
            .map_err(|_| ChannelError::Closed)
    }

    pub fn unbind(&self) -> ChannelResult<()> {
        self.command_tx
            .send(Command::Unbind)
            .map_err(|_| ChannelError::Closed)
    }

    pub fn send(&self, frame: ClientFrame) -> ChannelResult<()> {
        self.command_tx
            .send(Command::Send(frame))
            .map_err(|_| ChannelError::Closed)
    }
}

enum Establish<T: ChannelTransport> {
    Conn(T::Tx, T::Rx),
    /// Binding changed or cleared while connecting; restart from the top.
    Rebound,
    Shutdown,
}

/// The channel task. Construct with [`LiveChannel::new`], then spawn
/// [`LiveChannel::run`].
pub struct LiveChannel<T: ChannelTransport> {
    transport: T,
    config: ChannelConfig,
    command_rx: mpsc::UnboundedReceiver<Command>,
    inbound_tx: mpsc::UnboundedSender<ServerFrame>,
    status_tx: watch::Sender<ChannelStatus>,
    binding: Option<SessionKey>,
    queued: VecDeque<ClientFrame>,
}

impl<T: ChannelTransport> LiveChannel<T> {
    pub fn new(
        transport: T,
        config: ChannelConfig,
    ) -> (
        Self,
        LiveChannelHandle,
        mpsc::UnboundedReceiver<ServerFrame>,
        watch::Receiver<ChannelStatus>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Idle);

        let channel = Self {
            transport,
            config,
            command_rx,
            inbound_tx,
            status_tx,
            binding: None,
            queued: VecDeque::new(),
        };
        (channel, LiveChannelHandle { command_tx }, inbound_rx, status_rx)
    }

    pub async fn run(mut self) {
        'outer: loop {
            // Idle until a conversation is bound.
            while self.binding.is_none() {
                match self.command_rx.recv().await {
                    Some(Command::Bind(key)) => self.binding = Some(key),
                    Some(Command::Unbind) => {}
                    Some(Command::Send(frame)) => self.queue_or_drop(frame),
                    None => break 'outer,
                }
            }

            let (mut tx, mut rx) = match self.establish().await {
                Establish::Conn(tx, rx) => (tx, rx),
                Establish::Rebound => continue 'outer,
                Establish::Shutdown => break 'outer,
            };
            let _ = self.status_tx.send(ChannelStatus::Connected);

            // Drain frames queued while disconnected, oldest first.
            while let Some(frame) = self.queued.front().cloned() {
                match tx.send(frame).await {
                    Ok(()) => {
                        self.queued.pop_front();
                    }
                    Err(err) => {
                        warn!(%err, "queued send failed, reconnecting");
                        let _ = self.status_tx.send(ChannelStatus::Reconnecting);
                        continue 'outer;
                    }
                }
            }

            // Serve this connection epoch.
            loop {
                tokio::select! {
                    cmd = self.command_rx.recv() => match cmd {
                        Some(Command::Bind(key)) => {
                            if self.binding.as_ref() != Some(&key) {
                                // New conversation: a fresh connection epoch is
                                // the only way to leave the old room.
                                self.binding = Some(key);
                                let _ = self.status_tx.send(ChannelStatus::Reconnecting);
                                continue 'outer;
                            }
                        }
                        Some(Command::Unbind) => {
                            self.binding = None;
                            self.queued.clear();
                            let _ = self.status_tx.send(ChannelStatus::Idle);
                            continue 'outer;
                        }
                        Some(Command::Send(frame)) => {
                            if let Err(err) = tx.send(frame.clone()).await {
                                warn!(%err, "live send failed, reconnecting");
                                self.queue_or_drop(frame);
                                let _ = self.status_tx.send(ChannelStatus::Reconnecting);
                                continue 'outer;
                            }
                        }
                        None => break 'outer,
                    },
                    inbound = rx.recv() => match inbound {
                        Ok(Some(frame)) => {
                            if self.inbound_tx.send(frame).is_err() {
                                // Session loop is gone; nothing left to serve.
                                break 'outer;
                            }
                        }
                        Ok(None) => {
                            debug!("live channel closed by remote");
                            let _ = self.status_tx.send(ChannelStatus::Reconnecting);
                            continue 'outer;
                        }
                        Err(err) => {
                            warn!(%err, "live channel receive error");
                            let _ = self.status_tx.send(ChannelStatus::Reconnecting);
                            continue 'outer;
                        }
                    },
                }
            }
        }
    }

    /// Connect with backoff, announcing the binding current at each attempt.
    /// Commands keep being serviced while backing off, so a rebind issued
    /// during an outage is the one announced once the transport recovers.
    async fn establish(&mut self) -> Establish<T> {
        let mut backoff = self.config.initial_backoff;
        loop {
            let Some(key) = self.binding.clone() else {
                return Establish::Rebound;
            };

            match self.transport.connect().await {
                Ok((mut tx, rx)) => match tx.send(key.join_frame()).await {
                    Ok(()) => return Establish::Conn(tx, rx),
                    Err(err) => warn!(%err, "join announcement failed"),
                },
                Err(err) => debug!(%err, "connect attempt failed"),
            }
            let _ = self.status_tx.send(ChannelStatus::Reconnecting);

            let sleep = tokio::time::sleep(backoff);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    cmd = self.command_rx.recv() => match cmd {
                        Some(Command::Bind(key)) => {
                            // Latest binding wins at the next attempt.
                            self.binding = Some(key);
                        }
                        Some(Command::Unbind) => {
                            self.binding = None;
                            self.queued.clear();
                            let _ = self.status_tx.send(ChannelStatus::Idle);
                            return Establish::Rebound;
                        }
                        Some(Command::Send(frame)) => self.queue_or_drop(frame),
                        None => return Establish::Shutdown,
                    },
                }
            }
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }

    fn queue_or_drop(&mut self, frame: ClientFrame) {
        if !self.config.queue_outbound {
            warn!("live channel disconnected, dropping outbound frame");
            return;
        }
        if self.queued.len() >= self.config.queue_limit {
            warn!(
                limit = self.config.queue_limit,
                "outbound queue full, dropping oldest frame"
            );
            self.queued.pop_front();
        }
        self.queued.push_back(frame);
    }
}
