//! TCP listener group and stream framing.
//!
//! The byte stream is framed by two-byte big-endian length prefixes. A frame
//! is consumed only once fully buffered; responses go out through a writer
//! task per connection, so workers may finish out of order without
//! interleaving partial writes.

use crate::sink::TcpSink;
use crate::workers::{Job, WorkerPool};
use bytes::{Buf, BytesMut};
use shunt_plugin::Transport;
use shunt_proto::Message;
use socket2::{Domain, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, error, info, trace};

/// Per-connection limits, shared by every connection task.
#[derive(Debug, Clone, Copy)]
pub struct TcpLimits {
    /// Queries served on one connection before it is closed.
    pub max_queries_per_stream: usize,
    /// Idle read timeout.
    pub keep_alive: Duration,
}

fn bind_tcp(addr: SocketAddr, recv_buffer: usize) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, None)?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_recv_buffer_size(recv_buffer)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Binds `loops` reuseport listeners and spawns an accept loop on each.
pub fn spawn_tcp_loops(
    addr: SocketAddr,
    loops: usize,
    recv_buffer: usize,
    limits: TcpLimits,
    pool: Arc<WorkerPool>,
    shutdown: &broadcast::Sender<()>,
) -> io::Result<SocketAddr> {
    let first = bind_tcp(addr, recv_buffer)?;
    let local_addr = first.local_addr()?;

    let mut listeners = vec![first];
    for _ in 1..loops.max(1) {
        listeners.push(bind_tcp(local_addr, recv_buffer)?);
    }

    info!(addr = %local_addr, loops = listeners.len(), "tcp server listening");

    for listener in listeners {
        let pool = pool.clone();
        let shutdown = shutdown.subscribe();
        tokio::spawn(accept_loop(listener, local_addr, limits, pool, shutdown));
    }

    Ok(local_addr)
}

async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    limits: TcpLimits,
    pool: Arc<WorkerPool>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.recv() => return,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    error!(error = %err, "tcp accept failed");
                    continue;
                }
            },
        };

        let pool = pool.clone();
        tokio::spawn(async move {
            serve_connection(stream, peer, local_addr, limits, pool).await;
        });
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    local_addr: SocketAddr,
    limits: TcpLimits,
    pool: Arc<WorkerPool>,
) {
    trace!(client = %peer, "tcp connection open");

    let (mut read_half, write_half) = stream.into_split();
    let (frames_tx, frames_rx) = mpsc::channel(32);
    tokio::spawn(write_loop(write_half, frames_rx));

    let sink = Arc::new(TcpSink::new(frames_tx));
    let mut buf = BytesMut::with_capacity(4096);
    let mut served = 0usize;

    loop {
        // Consume every complete frame currently buffered: peek the 2-byte
        // prefix, and only take the frame once 2+len bytes are present.
        while buf.len() >= 2 {
            let frame_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
            if buf.len() < 2 + frame_len {
                break;
            }
            buf.advance(2);
            let frame = buf.split_to(frame_len);

            match Message::parse(&frame) {
                Ok(query) => {
                    pool.dispatch(Job {
                        query,
                        transport: Transport::Tcp,
                        local_addr,
                        remote_addr: peer,
                        sink: sink.clone(),
                    })
                    .await;

                    served += 1;
                    if served >= limits.max_queries_per_stream {
                        debug!(client = %peer, served, "tcp stream query limit reached");
                        return;
                    }
                }
                Err(err) => {
                    trace!(error = %err, client = %peer, "dropping malformed tcp query");
                }
            }
        }

        match timeout(limits.keep_alive, read_half.read_buf(&mut buf)).await {
            Ok(Ok(0)) => {
                trace!(client = %peer, "tcp connection closed by client");
                return;
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                debug!(error = %err, client = %peer, "tcp read failed");
                return;
            }
            Err(_) => {
                trace!(client = %peer, "tcp keep-alive timeout");
                return;
            }
        }
    }
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut frames: mpsc::Receiver<bytes::Bytes>) {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = write_half.write_all(&frame).await {
            debug!(error = %err, "tcp response write failed");
            return;
        }
    }
    let _ = write_half.shutdown().await;
}
