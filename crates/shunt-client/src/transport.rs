//! One-shot upstream exchanges over UDP and TCP.

use bytes::Bytes;
use shunt_proto::MAX_UDP_PAYLOAD;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{timeout_at, Instant};

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "upstream deadline exceeded")
}

/// Sends `query` to `upstream` and reads one response, all within `timeout`.
///
/// The socket is unconnected and shared through the pool, so datagrams from
/// other sources are skipped rather than returned.
pub async fn udp_query(
    socket: &UdpSocket,
    upstream: SocketAddr,
    timeout: Duration,
    query: &[u8],
) -> io::Result<Bytes> {
    let deadline = Instant::now() + timeout;

    timeout_at(deadline, socket.send_to(query, upstream))
        .await
        .map_err(|_| timed_out())??;

    let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
    loop {
        let (len, from) = timeout_at(deadline, socket.recv_from(&mut buf))
            .await
            .map_err(|_| timed_out())??;
        if from == upstream {
            buf.truncate(len);
            return Ok(buf.into());
        }
        // Stray datagram on a pooled socket; keep reading until the deadline.
    }
}

/// Dials `upstream`, performs one length-prefixed exchange and closes.
pub async fn tcp_query(
    upstream: SocketAddr,
    timeout: Duration,
    query: &[u8],
) -> io::Result<Bytes> {
    let deadline = Instant::now() + timeout;

    let len: u16 = query
        .len()
        .try_into()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "query exceeds 64KiB"))?;

    let mut stream = timeout_at(deadline, TcpStream::connect(upstream))
        .await
        .map_err(|_| timed_out())??;

    timeout_at(deadline, async {
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(query).await
    })
    .await
    .map_err(|_| timed_out())??;

    let response = timeout_at(deadline, async {
        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await?;
        let len = u16::from_be_bytes(len_buf) as usize;

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;
        Ok::<_, io::Error>(Bytes::from(body))
    })
    .await
    .map_err(|_| timed_out())??;

    Ok(response)
}
