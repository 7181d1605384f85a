//! Per-request state threaded through the stage chains.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// The transport a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Write-half of the originating connection.
///
/// `send` receives a complete serialized DNS message. The TCP implementation
/// prepends the RFC 1035 two-byte length prefix; the UDP implementation
/// writes the datagram as-is.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn send(&self, wire: Bytes) -> std::io::Result<()>;
}

/// State for one request, created when a packet is accepted and dropped when
/// its worker finishes. Never shared across requests.
pub struct RequestContext {
    pub transport: Transport,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub received_at: Instant,

    /// Set by the cache stage on a hit so the response chain skips
    /// re-admission.
    pub no_cache: bool,

    /// Set by the terminal response stage once bytes hit the wire. When the
    /// query chain finishes with this still false, the server synthesizes
    /// SERVFAIL.
    pub response_written: bool,

    sink: Arc<dyn ResponseSink>,
}

impl RequestContext {
    pub fn new(
        transport: Transport,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        Self {
            transport,
            local_addr,
            remote_addr,
            received_at: Instant::now(),
            no_cache: false,
            response_written: false,
            sink,
        }
    }

    /// The connection's write handle.
    pub fn sink(&self) -> &Arc<dyn ResponseSink> {
        &self.sink
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("transport", &self.transport)
            .field("remote_addr", &self.remote_addr)
            .field("no_cache", &self.no_cache)
            .field("response_written", &self.response_written)
            .finish()
    }
}
