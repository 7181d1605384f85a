//! Pre-bound UDP socket pool for upstream queries.
//!
//! Sockets are bound to ephemeral ports once at client start and recycled
//! through a lock-free ring. Acquisition is non-blocking: an empty pool is
//! an error the caller turns into SERVFAIL, never a wait.

use shunt_ring::RingBuffer;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Retries per slot while filling, matching transient bind failures.
const FILL_RETRIES: u32 = 3;

pub struct SocketPool {
    ring: RingBuffer<Arc<UdpSocket>>,
}

impl SocketPool {
    /// Creates the pool and eagerly binds sockets for every slot.
    ///
    /// Bind failures are retried a few times, then the slot is skipped; a
    /// partially filled pool is served with a warning rather than failing
    /// startup.
    pub async fn new(capacity: u64) -> Result<Self, shunt_ring::RingError> {
        let ring = RingBuffer::new(capacity)?;

        while !ring.is_full() {
            let mut bound = None;
            for attempt in 0..=FILL_RETRIES {
                match UdpSocket::bind("0.0.0.0:0").await {
                    Ok(socket) => {
                        bound = Some(socket);
                        break;
                    }
                    Err(err) => {
                        debug!(error = %err, attempt, "udp socket bind failed");
                        tokio::task::yield_now().await;
                    }
                }
            }
            match bound {
                Some(socket) => {
                    if ring.push(Arc::new(socket)).is_err() {
                        break;
                    }
                }
                None => break,
            }
        }

        if !ring.is_full() {
            warn!(
                filled = ring.len(),
                capacity = ring.capacity(),
                "failed to fill udp socket pool"
            );
        }

        Ok(Self { ring })
    }

    /// Takes a socket; `None` when the pool is exhausted.
    pub fn acquire(&self) -> Option<Arc<UdpSocket>> {
        self.ring.pop()
    }

    /// Returns a socket to the pool. Called on every exit path, error paths
    /// included; a full ring (which cannot happen while acquisitions are
    /// balanced) drops the socket instead.
    pub fn release(&self, socket: Arc<UdpSocket>) {
        if self.ring.push(socket).is_err() {
            debug!("socket pool full on release, dropping socket");
        }
    }

    pub fn len(&self) -> u64 {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        self.ring.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fills_to_capacity() {
        let pool = SocketPool::new(8).await.unwrap();
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.len(), 8);
    }

    #[tokio::test]
    async fn acquire_release_balances() {
        let pool = SocketPool::new(4).await.unwrap();

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.len(), 2);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.len(), 4);
    }

    #[tokio::test]
    async fn exhaustion_is_observable() {
        let pool = SocketPool::new(2).await.unwrap();
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
    }
}
