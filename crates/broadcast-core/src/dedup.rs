//! Deduplication cache — a TTL-bounded idempotency set keyed by a
//! content hash, evicting the oldest entry once `max_size` is reached.
//! Grounded on the gateway's dedupe cache pattern, adapted to async access
//! and a size-bounded eviction policy on top of TTL expiry.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    inserted_at: Instant,
}

/// Derives the default dedup key for a message with no explicit id: a
/// SHA-256 digest over channel, event, and the canonical JSON rendering of
/// its data (serde_json sorts object keys by default, giving a stable
/// encoding across equal payloads built in different field order).
pub fn content_key(channel: &str, event: &str, data: &Value) -> String {
    let canonical = serde_json::to_string(data).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(channel.as_bytes());
    hasher.update([0u8]);
    hasher.update(event.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// TTL + size-bounded idempotency cache. `check_and_insert` answers whether
/// a key has been seen within the TTL window, inserting it if not.
pub struct DedupCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    max_size: usize,
}

impl DedupCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        DedupCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_size,
        }
    }

    /// Returns `true` if `key` was already present (a duplicate); otherwise
    /// records it and returns `false`.
    pub async fn check_and_insert(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        Self::evict_expired(&mut entries, self.ttl);

        if entries.contains_key(key) {
            return true;
        }

        if entries.len() >= self.max_size {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_owned(),
            Entry {
                inserted_at: Instant::now(),
            },
        );
        false
    }

    fn evict_expired(entries: &mut HashMap<String, Entry>, ttl: Duration) {
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.inserted_at) < ttl);
    }

    /// Periodic sweep, independent of `check_and_insert`'s lazy eviction, so
    /// a quiet cache still reclaims memory.
    pub async fn sweep(&self) {
        let mut entries = self.entries.write().await;
        Self::evict_expired(&mut entries, self.ttl);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_key_is_stable_for_equal_payloads_in_different_field_order() {
        let a = content_key("room", "ping", &json!({"x": 1, "y": 2}));
        let b = content_key("room", "ping", &json!({"y": 2, "x": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn content_key_differs_when_channel_or_event_differs() {
        let base = content_key("room", "ping", &json!({}));
        assert_ne!(base, content_key("other-room", "ping", &json!({})));
        assert_ne!(base, content_key("room", "pong", &json!({})));
    }

    #[tokio::test]
    async fn first_occurrence_is_not_a_duplicate() {
        let cache = DedupCache::new(Duration::from_secs(60), 10);
        assert!(!cache.check_and_insert("msg-1").await);
    }

    #[tokio::test]
    async fn repeated_key_is_flagged_as_duplicate() {
        let cache = DedupCache::new(Duration::from_secs(60), 10);
        cache.check_and_insert("msg-1").await;
        assert!(cache.check_and_insert("msg-1").await);
    }

    #[tokio::test]
    async fn expired_entries_stop_counting_as_duplicates() {
        let cache = DedupCache::new(Duration::from_millis(5), 10);
        cache.check_and_insert("msg-1").await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(!cache.check_and_insert("msg-1").await);
    }

    #[tokio::test]
    async fn oldest_entry_is_evicted_once_max_size_reached() {
        let cache = DedupCache::new(Duration::from_secs(60), 2);
        cache.check_and_insert("a").await;
        cache.check_and_insert("b").await;
        cache.check_and_insert("c").await;
        assert_eq!(cache.len().await, 2);
        assert!(!cache.check_and_insert("a").await);
    }

    #[tokio::test]
    async fn sweep_reclaims_expired_entries_without_a_lookup() {
        let cache = DedupCache::new(Duration::from_millis(5), 10);
        cache.check_and_insert("a").await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        cache.sweep().await;
        assert!(cache.is_empty().await);
    }
}
