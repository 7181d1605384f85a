//! The bounded TTL store behind the cache plugin.

use moka::sync::Cache;
use shunt_proto::Message;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A cached response plus the bookkeeping needed to age it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The admitted response, stored with its original TTLs.
    pub message: Message,
    /// When the entry was admitted.
    pub received_at: Instant,
    /// Admission TTL (minimum across the response, clamped).
    pub ttl: Duration,
}

/// Bounded concurrent store with a hard expiry horizon.
///
/// Capacity eviction and the `stale_duration` time-to-live are enforced by
/// the underlying cache; the remaining-lifetime arithmetic happens at read
/// time against the entry's own `received_at`, so a served response's TTLs
/// never exceed what a fresh admission would have carried.
pub struct CacheStore {
    cache: Cache<String, Arc<CacheEntry>>,
    stale_duration: Duration,
}

impl CacheStore {
    pub fn new(capacity: u64, stale_duration: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(stale_duration)
            .eviction_listener(|key: Arc<String>, _entry, cause| {
                debug!(key = %key, cause = ?cause, "cache eviction");
            })
            .build();
        Self {
            cache,
            stale_duration,
        }
    }

    /// Admits `message` under `key` with the current time as arrival.
    pub fn insert(&self, key: String, message: Message, ttl: Duration) {
        self.insert_at(key, message, ttl, Instant::now());
    }

    /// Admits with an explicit arrival instant (warm starts, tests).
    pub fn insert_at(&self, key: String, message: Message, ttl: Duration, received_at: Instant) {
        self.cache.insert(
            key,
            Arc::new(CacheEntry {
                message,
                received_at,
                ttl,
            }),
        );
    }

    /// Looks up `key` and returns a served copy with rewritten TTLs.
    ///
    /// Within the entry's TTL the copy carries the remaining lifetime.
    /// Past it, `None` unless `allow_stale`, in which case the copy carries
    /// `stale_ttl`. Past `stale_duration`, always `None`.
    pub fn get(&self, key: &str, allow_stale: bool, stale_ttl: Duration) -> Option<Message> {
        let entry = self.cache.get(key)?;
        let elapsed = entry.received_at.elapsed();

        if elapsed >= self.stale_duration {
            return None;
        }

        let remaining = if elapsed < entry.ttl {
            entry.ttl - elapsed
        } else if allow_stale {
            stale_ttl
        } else {
            return None;
        };

        let mut served = entry.message.clone();
        served.set_ttl(remaining);
        Some(served)
    }

    /// Number of live entries (approximate under concurrency).
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shunt_proto::{Name, Question, ResourceRecord};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn response(name: &str, ttl: u32) -> Message {
        let query = Message::query(Question::a(Name::from_str(name).unwrap()));
        let mut resp = Message::response_to(&query);
        resp.add_answer(ResourceRecord::a(
            Name::from_str(name).unwrap(),
            ttl,
            Ipv4Addr::new(192, 0, 2, 1),
        ));
        resp
    }

    const STALE_TTL: Duration = Duration::from_secs(30);

    #[test]
    fn fresh_entry_reports_remaining_lifetime() {
        let store = CacheStore::new(16, Duration::from_secs(3600));
        store.insert_at(
            "k".into(),
            response("a.test", 300),
            Duration::from_secs(300),
            Instant::now().checked_sub(Duration::from_secs(100)).unwrap(),
        );

        let served = store.get("k", false, STALE_TTL).unwrap();
        let ttl = served.answers()[0].ttl();
        assert!((199..=200).contains(&ttl), "ttl was {}", ttl);
    }

    #[test]
    fn expired_entry_needs_allow_stale() {
        let store = CacheStore::new(16, Duration::from_secs(3600));
        store.insert_at(
            "k".into(),
            response("a.test", 60),
            Duration::from_secs(60),
            Instant::now().checked_sub(Duration::from_secs(90)).unwrap(),
        );

        assert!(store.get("k", false, STALE_TTL).is_none());
        let served = store.get("k", true, STALE_TTL).unwrap();
        assert_eq!(served.answers()[0].ttl(), 30);
    }

    #[test]
    fn stale_horizon_is_absolute() {
        let store = CacheStore::new(16, Duration::from_secs(120));
        store.insert_at(
            "k".into(),
            response("a.test", 60),
            Duration::from_secs(60),
            Instant::now().checked_sub(Duration::from_secs(150)).unwrap(),
        );

        assert!(store.get("k", true, STALE_TTL).is_none());
    }

    #[test]
    fn served_copy_does_not_age_the_stored_entry() {
        let store = CacheStore::new(16, Duration::from_secs(3600));
        store.insert("k".into(), response("a.test", 300), Duration::from_secs(300));

        let first = store.get("k", false, STALE_TTL).unwrap();
        let second = store.get("k", false, STALE_TTL).unwrap();
        // Both reads derive from the original admission, not from each other.
        assert!(first.answers()[0].ttl() >= second.answers()[0].ttl());
        assert!(second.answers()[0].ttl() >= 299);
    }

    #[test]
    fn clear_empties_the_store() {
        let store = CacheStore::new(16, Duration::from_secs(3600));
        store.insert("k".into(), response("a.test", 300), Duration::from_secs(300));
        store.clear();
        assert!(store.get("k", true, STALE_TTL).is_none());
    }
}
