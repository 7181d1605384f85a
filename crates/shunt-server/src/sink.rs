//! Response sinks: the write halves handed to the pipeline.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use shunt_plugin::ResponseSink;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Writes datagrams back to the client through the receiving socket, so the
/// reply's source port matches what the client queried.
pub struct UdpSink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpSink {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }
}

#[async_trait]
impl ResponseSink for UdpSink {
    async fn send(&self, wire: Bytes) -> io::Result<()> {
        let sent = self.socket.send_to(&wire, self.peer).await?;
        if sent != wire.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short udp response write",
            ));
        }
        Ok(())
    }
}

/// Queues length-prefixed frames to a connection's writer task.
///
/// Workers finish in any order, so responses on one connection may reorder;
/// clients demultiplex by transaction id.
pub struct TcpSink {
    frames: mpsc::Sender<Bytes>,
}

impl TcpSink {
    pub fn new(frames: mpsc::Sender<Bytes>) -> Self {
        Self { frames }
    }
}

#[async_trait]
impl ResponseSink for TcpSink {
    async fn send(&self, wire: Bytes) -> io::Result<()> {
        let len: u16 = wire.len().try_into().map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "response exceeds 64KiB")
        })?;

        let mut frame = BytesMut::with_capacity(2 + wire.len());
        frame.put_u16(len);
        frame.extend_from_slice(&wire);

        self.frames
            .send(frame.freeze())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))
    }
}
