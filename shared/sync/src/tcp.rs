//! TCP implementation of the channel transport, speaking the length-prefixed
//! JSON framing from `pairchat-protocol`.

use crate::channel::{ChannelError, ChannelResult, ChannelSink, ChannelStream, ChannelTransport};
use async_trait::async_trait;
use pairchat_protocol::wire::{read_frame, write_frame, ClientFrame, ServerFrame};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Connects to a PairChat relay over TCP.
#[derive(Debug, Clone)]
pub struct TcpChannelTransport {
    addr: String,
}

impl TcpChannelTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl ChannelTransport for TcpChannelTransport {
    type Tx = TcpFrameSink;
    type Rx = TcpFrameStream;

    async fn connect(&self) -> ChannelResult<(Self::Tx, Self::Rx)> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        let (read, write) = stream.into_split();
        Ok((TcpFrameSink { write }, TcpFrameStream { read }))
    }
}

pub struct TcpFrameSink {
    write: OwnedWriteHalf,
}

#[async_trait]
impl ChannelSink for TcpFrameSink {
    async fn send(&mut self, frame: ClientFrame) -> ChannelResult<()> {
        write_frame(&mut self.write, &frame)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}

pub struct TcpFrameStream {
    read: OwnedReadHalf,
}

#[async_trait]
impl ChannelStream for TcpFrameStream {
    async fn recv(&mut self) -> ChannelResult<Option<ServerFrame>> {
        read_frame(&mut self.read)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}
