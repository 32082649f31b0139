//! Presence heartbeat — tracks per-channel `socket-id -> last-seen` and
//! evicts silent members on a sweep, invoking a removal callback so the
//! orchestrator can broadcast `member_removed` and update the registry.

use broadcast_protocol::PresenceMember;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    member: PresenceMember,
    last_seen: Instant,
}

#[derive(Default)]
pub struct PresenceHeartbeat {
    channels: RwLock<HashMap<String, HashMap<String, Entry>>>,
}

impl PresenceHeartbeat {
    pub fn new() -> Self {
        PresenceHeartbeat {
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub async fn track(&self, channel: &str, socket_id: &str, member: PresenceMember) {
        let mut channels = self.channels.write().await;
        channels.entry(channel.to_owned()).or_default().insert(
            socket_id.to_owned(),
            Entry {
                member,
                last_seen: Instant::now(),
            },
        );
    }

    pub async fn untrack(&self, channel: &str, socket_id: &str) {
        let mut channels = self.channels.write().await;
        if let Some(members) = channels.get_mut(channel) {
            members.remove(socket_id);
            if members.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Refreshes `last-seen` for an incoming `presence_heartbeat` frame.
    /// Returns `false` if the socket isn't tracked on that channel (stale
    /// heartbeat after an unsubscribe the client hasn't learned of yet).
    pub async fn refresh(&self, channel: &str, socket_id: &str) -> bool {
        let mut channels = self.channels.write().await;
        let Some(members) = channels.get_mut(channel) else {
            return false;
        };
        let Some(entry) = members.get_mut(socket_id) else {
            return false;
        };
        entry.last_seen = Instant::now();
        true
    }

    /// Evicts every entry whose silence exceeds `timeout`, returning
    /// `(channel, socket_id, member)` for each so the caller can emit
    /// `member_removed`.
    pub async fn sweep(&self, timeout: Duration) -> Vec<(String, String, PresenceMember)> {
        let mut channels = self.channels.write().await;
        let now = Instant::now();
        let mut evicted = Vec::new();

        channels.retain(|channel, members| {
            members.retain(|socket_id, entry| {
                if now.duration_since(entry.last_seen) > timeout {
                    evicted.push((channel.clone(), socket_id.clone(), entry.member.clone()));
                    false
                } else {
                    true
                }
            });
            !members.is_empty()
        });

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadcast_protocol::PresenceId;
    use serde_json::json;

    fn member(id: &str) -> PresenceMember {
        PresenceMember {
            id: PresenceId::Str(id.to_owned()),
            info: json!({}),
        }
    }

    #[tokio::test]
    async fn refresh_updates_a_tracked_socket() {
        let hb = PresenceHeartbeat::new();
        hb.track("presence-room", "sock-1", member("alice")).await;
        assert!(hb.refresh("presence-room", "sock-1").await);
    }

    #[tokio::test]
    async fn refresh_of_untracked_socket_returns_false() {
        let hb = PresenceHeartbeat::new();
        assert!(!hb.refresh("presence-room", "sock-1").await);
    }

    #[tokio::test]
    async fn sweep_evicts_silent_members() {
        let hb = PresenceHeartbeat::new();
        hb.track("presence-room", "sock-1", member("alice")).await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        let evicted = hb.sweep(Duration::from_millis(5)).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].1, "sock-1");
    }

    #[tokio::test]
    async fn sweep_keeps_recently_refreshed_members() {
        let hb = PresenceHeartbeat::new();
        hb.track("presence-room", "sock-1", member("alice")).await;
        hb.refresh("presence-room", "sock-1").await;
        let evicted = hb.sweep(Duration::from_secs(60)).await;
        assert!(evicted.is_empty());
    }

    #[tokio::test]
    async fn untrack_removes_empty_channel_entry() {
        let hb = PresenceHeartbeat::new();
        hb.track("presence-room", "sock-1", member("alice")).await;
        hb.untrack("presence-room", "sock-1").await;
        assert!(!hb.refresh("presence-room", "sock-1").await);
    }
}
