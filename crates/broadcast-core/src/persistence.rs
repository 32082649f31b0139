//! Persistence (optional) — a per-channel, time-ordered window of
//! recent messages, trimmed by both count and age.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub event: String,
    pub data: Value,
    #[serde(skip)]
    pub stored_at: Instant,
    #[serde(rename = "socketId", skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,
}

pub struct PersistenceStore {
    ttl: Duration,
    max_messages: usize,
    exclude_events: Vec<String>,
    channels: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl PersistenceStore {
    pub fn new(ttl: Duration, max_messages: usize, exclude_events: Vec<String>) -> Self {
        PersistenceStore {
            ttl,
            max_messages,
            exclude_events,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Appends a message to `channel`'s window, unless `event` is on the
    /// exclude list. Trims to `max_messages` and drops anything older than
    /// `ttl`.
    pub async fn store(&self, channel: &str, event: &str, data: Value, socket_id: Option<String>) {
        if self.exclude_events.iter().any(|e| e == event) {
            return;
        }

        let mut channels = self.channels.write().await;
        let window = channels.entry(channel.to_owned()).or_default();
        let now = Instant::now();
        window.retain(|m| now.duration_since(m.stored_at) < self.ttl);

        window.push(StoredMessage {
            id: Uuid::new_v4().to_string(),
            event: event.to_owned(),
            data,
            stored_at: now,
            socket_id,
        });

        if window.len() > self.max_messages {
            let overflow = window.len() - self.max_messages;
            window.drain(0..overflow);
        }
    }

    /// Returns messages stored after `since` (exclusive), oldest first, up
    /// to `limit` entries.
    pub async fn history(
        &self,
        channel: &str,
        since: Option<Instant>,
        limit: usize,
    ) -> Vec<StoredMessage> {
        let channels = self.channels.read().await;
        let Some(window) = channels.get(channel) else {
            return Vec::new();
        };
        window
            .iter()
            .filter(|m| since.is_none_or(|cutoff| m.stored_at > cutoff))
            .take(limit)
            .cloned()
            .collect()
    }
}
