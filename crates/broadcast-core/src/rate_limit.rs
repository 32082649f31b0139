//! Rate limiter — fixed-window counters keyed by socket/user, optionally
//! scoped per-channel. A background sweep evicts windows that have expired
//! so the counter map doesn't grow unbounded across idle keys.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Window {
    count: u32,
    started_at: Instant,
}

/// Assembles the counter key for a client event, matching the
/// `user:{id}` / `socket:{id}` scheme with an optional `:channel:{name}`
/// suffix when per-channel limiting is enabled.
pub fn key(socket_id: &str, user_id: Option<&str>, channel: Option<&str>, per_channel: bool) -> String {
    let base = match user_id {
        Some(uid) => format!("user:{uid}"),
        None => format!("socket:{socket_id}"),
    };
    match (per_channel, channel) {
        (true, Some(ch)) => format!("{base}:channel:{ch}"),
        _ => base,
    }
}

pub struct RateLimiter {
    max: u32,
    window: Duration,
    windows: RwLock<HashMap<String, Window>>,
}

pub enum Decision {
    Allow,
    Deny { retry_after_ms: u64 },
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        RateLimiter {
            max,
            window,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Increments the counter for `key` and decides whether the current
    /// request is allowed under the fixed window.
    pub async fn check(&self, key: &str) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let entry = windows.entry(key.to_owned()).or_insert_with(|| Window {
            count: 0,
            started_at: now,
        });

        if now.duration_since(entry.started_at) >= self.window {
            entry.count = 0;
            entry.started_at = now;
        }

        if entry.count >= self.max {
            let elapsed = now.duration_since(entry.started_at);
            let retry_after_ms = self.window.saturating_sub(elapsed).as_millis() as u64;
            return Decision::Deny { retry_after_ms };
        }

        entry.count += 1;
        Decision::Allow
    }

    /// Drops windows whose expiry has passed, run periodically by the
    /// orchestrator on a fixed cadence.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let window = self.window;
        self.windows
            .write()
            .await
            .retain(|_, w| now.duration_since(w.started_at) < window);
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_configured_max() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(matches!(limiter.check("k").await, Decision::Allow));
        assert!(matches!(limiter.check("k").await, Decision::Allow));
        assert!(matches!(limiter.check("k").await, Decision::Deny { .. }));
    }

    #[tokio::test]
    async fn distinct_keys_have_independent_windows() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(matches!(limiter.check("a").await, Decision::Allow));
        assert!(matches!(limiter.check("b").await, Decision::Allow));
    }

    #[tokio::test]
    async fn sweep_drops_expired_windows() {
        let limiter = RateLimiter::new(1, Duration::from_millis(1));
        limiter.check("k").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        limiter.sweep().await;
        assert_eq!(limiter.tracked_keys().await, 0);
    }

    #[test]
    fn key_prefers_user_id_over_socket_id() {
        assert_eq!(key("sock-1", Some("42"), None, false), "user:42");
        assert_eq!(key("sock-1", None, None, false), "socket:sock-1");
    }

    #[test]
    fn key_appends_channel_suffix_when_per_channel_enabled() {
        assert_eq!(
            key("sock-1", Some("42"), Some("room"), true),
            "user:42:channel:room"
        );
        assert_eq!(key("sock-1", Some("42"), Some("room"), false), "user:42");
    }
}
