//! Channel registry — tracks which sockets are subscribed to which
//! channel and, for presence channels, which member each socket maps to.

use broadcast_protocol::{ChannelClass, PresenceData, PresenceMember};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A single channel's subscriber set. Presence channels additionally carry a
/// socket-id -> member mapping so member_added/member_removed payloads and
/// `/stats` can be rendered without recomputing membership elsewhere.
#[derive(Debug, Default)]
struct Channel {
    class: Option<ChannelClass>,
    subscribers: HashMap<String, Option<PresenceMember>>,
}

impl Channel {
    fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Outcome of a subscribe call, telling the caller whether this is the
/// channel's first subscriber (channel just created) and, for presence
/// channels, the member roster after the join.
#[derive(Debug, Clone)]
pub struct SubscribeOutcome {
    pub channel_created: bool,
    pub presence: Option<PresenceData>,
}

/// Outcome of an unsubscribe call.
#[derive(Debug, Clone)]
pub struct UnsubscribeOutcome {
    pub channel_destroyed: bool,
    pub presence: Option<PresenceData>,
}

/// In-memory channel registry. One instance per server node; cross-node
/// membership is reconciled by the relay adapter, not here.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        ChannelRegistry {
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn channel_type(name: &str) -> ChannelClass {
        ChannelClass::of(name)
    }

    /// Adds `socket_id` as a subscriber of `channel`, creating the channel if
    /// this is its first subscriber. `member` is `Some` for presence
    /// channels and ignored otherwise.
    pub async fn subscribe(
        &self,
        channel: &str,
        socket_id: &str,
        member: Option<PresenceMember>,
    ) -> SubscribeOutcome {
        let class = Self::channel_type(channel);
        let mut channels = self.channels.write().await;
        let entry = channels.entry(channel.to_owned()).or_default();
        let channel_created = entry.subscribers.is_empty();
        if entry.class.is_none() {
            entry.class = Some(class);
        }
        entry.subscribers.insert(socket_id.to_owned(), member);

        let presence = if class.is_presence() {
            Some(PresenceData::from_members(
                entry.subscribers.values().filter_map(|m| m.as_ref()),
            ))
        } else {
            None
        };

        SubscribeOutcome {
            channel_created,
            presence,
        }
    }

    /// Removes `socket_id` from `channel`. Destroys the channel entry once
    /// its last subscriber leaves (invariant: no empty channel lingers).
    pub async fn unsubscribe(&self, channel: &str, socket_id: &str) -> UnsubscribeOutcome {
        let mut channels = self.channels.write().await;
        let Some(entry) = channels.get_mut(channel) else {
            return UnsubscribeOutcome {
                channel_destroyed: false,
                presence: None,
            };
        };
        entry.subscribers.remove(socket_id);

        let presence = if entry.class.is_some_and(ChannelClass::is_presence) {
            Some(PresenceData::from_members(
                entry.subscribers.values().filter_map(|m| m.as_ref()),
            ))
        } else {
            None
        };

        let channel_destroyed = entry.is_empty();
        if channel_destroyed {
            channels.remove(channel);
        }

        UnsubscribeOutcome {
            channel_destroyed,
            presence,
        }
    }

    /// Removes `socket_id` from every channel it belongs to (connection
    /// close). Returns the list of channels it was removed from, each paired
    /// with whether that removal destroyed the channel.
    pub async fn unsubscribe_all(&self, socket_id: &str) -> Vec<(String, UnsubscribeOutcome)> {
        let member_of: Vec<String> = {
            let channels = self.channels.read().await;
            channels
                .iter()
                .filter(|(_, c)| c.subscribers.contains_key(socket_id))
                .map(|(name, _)| name.clone())
                .collect()
        };
        let mut results = Vec::with_capacity(member_of.len());
        for channel in member_of {
            let outcome = self.unsubscribe(&channel, socket_id).await;
            results.push((channel, outcome));
        }
        results
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map_or(0, |c| c.subscribers.len())
    }

    pub async fn channel_exists(&self, channel: &str) -> bool {
        self.channels.read().await.contains_key(channel)
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn channel_names(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    pub async fn subscriber_ids(&self, channel: &str) -> Vec<String> {
        self.channels
            .read()
            .await
            .get(channel)
            .map(|c| c.subscribers.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn presence_data(&self, channel: &str) -> Option<PresenceData> {
        let channels = self.channels.read().await;
        let entry = channels.get(channel)?;
        if !entry.class.is_some_and(ChannelClass::is_presence) {
            return None;
        }
        Some(PresenceData::from_members(
            entry.subscribers.values().filter_map(|m| m.as_ref()),
        ))
    }
}
