//! Relay adapter — cross-node pub/sub plus shared, TTL-bounded
//! channel/presence/connection state. `RelayAdapter` is the contract any
//! backend (in-memory for a single node, Redis for a fleet) must honor; the
//! orchestrator only ever talks to this trait, never to a concrete backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{Duration, Instant};

use crate::config::{RELAY_CHANNEL_TTL, RELAY_CONNECTION_TTL, RELAY_PRESENCE_TTL};

/// A cross-node broadcast message. `server_id` identifies the originating
/// node so receivers can apply the loopback guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub channel: String,
    pub event: String,
    pub data: Value,
    #[serde(rename = "socketId", skip_serializing_if = "Option::is_none")]
    pub socket_id: Option<String>,
    #[serde(rename = "serverId")]
    pub server_id: String,
}

impl Envelope {
    pub fn broadcast(
        channel: impl Into<String>,
        event: impl Into<String>,
        data: Value,
        socket_id: Option<String>,
        server_id: impl Into<String>,
    ) -> Self {
        Envelope {
            kind: "broadcast",
            channel: channel.into(),
            event: event.into(),
            data,
            socket_id,
            server_id: server_id.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay transport error: {0}")]
    Transport(String),
}

/// Inbound stream of envelopes already filtered for loopback: the adapter
/// never hands the orchestrator an envelope this node itself published.
pub type Inbound = broadcast::Receiver<Envelope>;

#[async_trait]
pub trait RelayAdapter: Send + Sync {
    fn server_id(&self) -> &str;

    async fn publish(&self, envelope: Envelope) -> Result<(), RelayError>;

    fn subscribe(&self) -> Inbound;

    async fn store_channel(&self, channel: &str, socket_id: &str) -> Result<(), RelayError>;
    async fn remove_channel(&self, channel: &str, socket_id: &str) -> Result<(), RelayError>;
    async fn channel_members(&self, channel: &str) -> Result<Vec<String>, RelayError>;

    async fn store_presence_member(
        &self,
        channel: &str,
        socket_id: &str,
        member: Value,
    ) -> Result<(), RelayError>;
    async fn remove_presence_member(&self, channel: &str, socket_id: &str) -> Result<(), RelayError>;
    async fn presence_members(&self, channel: &str) -> Result<HashMap<String, Value>, RelayError>;

    async fn store_connection(&self, socket_id: &str, snapshot: Value) -> Result<(), RelayError>;
    async fn remove_connection(&self, socket_id: &str) -> Result<(), RelayError>;

    async fn health_check(&self) -> Result<(), RelayError>;
}

struct Ttl<V> {
    value: V,
    expires_at: Instant,
}

/// Single-process relay: the default backend when no `relay-redis` node
/// string is configured, and the vehicle for the multi-node loopback tests
/// (two instances can share one `broadcast::Sender` to emulate a bus).
pub struct InMemoryRelay {
    server_id: String,
    bus: broadcast::Sender<Envelope>,
    channels: RwLock<HashMap<String, Ttl<Vec<String>>>>,
    presence: RwLock<HashMap<String, Ttl<HashMap<String, Value>>>>,
    connections: RwLock<HashMap<String, Ttl<Value>>>,
}

impl InMemoryRelay {
    /// A standalone node with its own, unshared bus (single-node mode).
    pub fn standalone(server_id: impl Into<String>) -> Arc<Self> {
        let (bus, _rx) = broadcast::channel(1024);
        Self::with_bus(server_id, bus)
    }

    /// A node attached to a bus shared with other `InMemoryRelay`
    /// instances, simulating a multi-node fleet in a single process.
    pub fn with_bus(server_id: impl Into<String>, bus: broadcast::Sender<Envelope>) -> Arc<Self> {
        Arc::new(InMemoryRelay {
            server_id: server_id.into(),
            bus,
            channels: RwLock::new(HashMap::new()),
            presence: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        })
    }

    pub fn shared_bus() -> broadcast::Sender<Envelope> {
        broadcast::channel(1024).0
    }
}

#[async_trait]
impl RelayAdapter for InMemoryRelay {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    async fn publish(&self, envelope: Envelope) -> Result<(), RelayError> {
        // No subscribers is not an error: a lone node with nothing
        // listening yet still "publishes" successfully.
        let _ = self.bus.send(envelope);
        Ok(())
    }

    fn subscribe(&self) -> Inbound {
        self.bus.subscribe()
    }

    async fn store_channel(&self, channel: &str, socket_id: &str) -> Result<(), RelayError> {
        let mut channels = self.channels.write().await;
        let entry = channels.entry(channel.to_owned()).or_insert_with(|| Ttl {
            value: Vec::new(),
            expires_at: Instant::now() + RELAY_CHANNEL_TTL,
        });
        if !entry.value.iter().any(|s| s == socket_id) {
            entry.value.push(socket_id.to_owned());
        }
        entry.expires_at = Instant::now() + RELAY_CHANNEL_TTL;
        Ok(())
    }

    async fn remove_channel(&self, channel: &str, socket_id: &str) -> Result<(), RelayError> {
        let mut channels = self.channels.write().await;
        if let Some(entry) = channels.get_mut(channel) {
            entry.value.retain(|s| s != socket_id);
            if entry.value.is_empty() {
                channels.remove(channel);
            }
        }
        Ok(())
    }

    async fn channel_members(&self, channel: &str) -> Result<Vec<String>, RelayError> {
        let channels = self.channels.read().await;
        Ok(channels
            .get(channel)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
            .unwrap_or_default())
    }

    async fn store_presence_member(
        &self,
        channel: &str,
        socket_id: &str,
        member: Value,
    ) -> Result<(), RelayError> {
        let mut presence = self.presence.write().await;
        let entry = presence.entry(channel.to_owned()).or_insert_with(|| Ttl {
            value: HashMap::new(),
            expires_at: Instant::now() + RELAY_PRESENCE_TTL,
        });
        entry.value.insert(socket_id.to_owned(), member);
        entry.expires_at = Instant::now() + RELAY_PRESENCE_TTL;
        Ok(())
    }

    async fn remove_presence_member(&self, channel: &str, socket_id: &str) -> Result<(), RelayError> {
        let mut presence = self.presence.write().await;
        if let Some(entry) = presence.get_mut(channel) {
            entry.value.remove(socket_id);
            if entry.value.is_empty() {
                presence.remove(channel);
            }
        }
        Ok(())
    }

    async fn presence_members(&self, channel: &str) -> Result<HashMap<String, Value>, RelayError> {
        let presence = self.presence.read().await;
        Ok(presence
            .get(channel)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
            .unwrap_or_default())
    }

    async fn store_connection(&self, socket_id: &str, snapshot: Value) -> Result<(), RelayError> {
        self.connections.write().await.insert(
            socket_id.to_owned(),
            Ttl {
                value: snapshot,
                expires_at: Instant::now() + RELAY_CONNECTION_TTL,
            },
        );
        Ok(())
    }

    async fn remove_connection(&self, socket_id: &str) -> Result<(), RelayError> {
        self.connections.write().await.remove(socket_id);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

/// Filters an adapter's raw inbound stream for the loopback guard: envelopes
/// whose `server_id` matches `local_server_id` are never yielded. Kept as a
/// free function (rather than baked into every backend) so a backend that
/// can't filter server-side still gets the invariant.
pub async fn next_remote_envelope(
    inbound: &mut Inbound,
    local_server_id: &str,
) -> Option<Envelope> {
    loop {
        match inbound.recv().await {
            Ok(envelope) if envelope.server_id == local_server_id => continue,
            Ok(envelope) => return Some(envelope),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn single_node_publish_with_no_subscriber_succeeds() {
        let relay = InMemoryRelay::standalone("node-1");
        let result = relay
            .publish(Envelope::broadcast("x", "e", json!({}), None, "node-1"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn two_nodes_sharing_a_bus_relay_across() {
        let bus = InMemoryRelay::shared_bus();
        let node1 = InMemoryRelay::with_bus("node-1", bus.clone());
        let node2 = InMemoryRelay::with_bus("node-2", bus);
        let mut node2_inbound = node2.subscribe();

        node1
            .publish(Envelope::broadcast("x", "e", json!({}), None, "node-1"))
            .await
            .unwrap();

        let received = next_remote_envelope(&mut node2_inbound, node2.server_id())
            .await
            .unwrap();
        assert_eq!(received.channel, "x");
        assert_eq!(received.server_id, "node-1");
    }

    #[tokio::test]
    async fn loopback_envelope_is_never_yielded() {
        let bus = InMemoryRelay::shared_bus();
        let node1 = InMemoryRelay::with_bus("node-1", bus);
        let mut own_inbound = node1.subscribe();

        node1
            .publish(Envelope::broadcast("x", "e", json!({}), None, "node-1"))
            .await
            .unwrap();

        // Give the broadcast channel a message to deliver, then confirm the
        // loopback filter drops it rather than yielding it.
        tokio::time::timeout(
            Duration::from_millis(50),
            next_remote_envelope(&mut own_inbound, node1.server_id()),
        )
        .await
        .expect_err("no non-loopback envelope should ever arrive");
    }

    #[tokio::test]
    async fn channel_membership_round_trips() {
        let relay = InMemoryRelay::standalone("node-1");
        relay.store_channel("x", "sock-1").await.unwrap();
        relay.store_channel("x", "sock-2").await.unwrap();
        assert_eq!(relay.channel_members("x").await.unwrap().len(), 2);
        relay.remove_channel("x", "sock-1").await.unwrap();
        assert_eq!(relay.channel_members("x").await.unwrap(), vec!["sock-2"]);
    }

    #[tokio::test]
    async fn presence_membership_round_trips() {
        let relay = InMemoryRelay::standalone("node-1");
        relay
            .store_presence_member("presence-room", "sock-1", json!({"name": "alice"}))
            .await
            .unwrap();
        let members = relay.presence_members("presence-room").await.unwrap();
        assert_eq!(members.len(), 1);
        relay
            .remove_presence_member("presence-room", "sock-1")
            .await
            .unwrap();
        assert!(relay.presence_members("presence-room").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_check_succeeds_for_in_memory_backend() {
        let relay = InMemoryRelay::standalone("node-1");
        assert!(relay.health_check().await.is_ok());
    }
}
