//! UDP listener group.
//!
//! One listener task per event loop, each with its own SO_REUSEPORT socket,
//! so the kernel spreads datagrams across loops without a user-space
//! dispatcher in the hot path.

use crate::sink::UdpSink;
use crate::workers::{Job, WorkerPool};
use shunt_plugin::Transport;
use shunt_proto::{Message, MAX_UDP_PAYLOAD};
use socket2::{Domain, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{error, info, trace};

/// Builds a reuseport UDP socket bound to `addr`.
fn bind_udp(addr: SocketAddr, recv_buffer: usize) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, None)?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_recv_buffer_size(recv_buffer)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Binds `loops` reuseport sockets and spawns a receive loop on each.
///
/// The first bind resolves the concrete port (supporting `:0` listens); the
/// rest join it. Returns the bound address.
pub fn spawn_udp_loops(
    addr: SocketAddr,
    loops: usize,
    recv_buffer: usize,
    pool: Arc<WorkerPool>,
    shutdown: &broadcast::Sender<()>,
) -> io::Result<SocketAddr> {
    let first = bind_udp(addr, recv_buffer)?;
    let local_addr = first.local_addr()?;

    let mut sockets = vec![first];
    for _ in 1..loops.max(1) {
        sockets.push(bind_udp(local_addr, recv_buffer)?);
    }

    info!(addr = %local_addr, loops = sockets.len(), "udp server listening");

    for socket in sockets {
        let pool = pool.clone();
        let shutdown = shutdown.subscribe();
        tokio::spawn(udp_loop(Arc::new(socket), local_addr, pool, shutdown));
    }

    Ok(local_addr)
}

async fn udp_loop(
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    pool: Arc<WorkerPool>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_UDP_PAYLOAD];

    loop {
        let (len, peer) = tokio::select! {
            _ = shutdown.recv() => return,
            received = socket.recv_from(&mut buf) => match received {
                Ok(pair) => pair,
                Err(err) => {
                    error!(error = %err, "udp receive failed");
                    continue;
                }
            },
        };

        // One datagram is one DNS message. Unparsable packets are dropped
        // without an answer; there is no trustworthy id to reply to.
        let query = match Message::parse(&buf[..len]) {
            Ok(query) => query,
            Err(err) => {
                trace!(error = %err, client = %peer, "dropping malformed udp query");
                continue;
            }
        };

        pool.dispatch(Job {
            query,
            transport: Transport::Udp,
            local_addr,
            remote_addr: peer,
            sink: Arc::new(UdpSink::new(socket.clone(), peer)),
        })
        .await;
    }
}
