//! Redis-backed `RelayAdapter`, available behind the `relay-redis` feature
//! for deployments running more than one node. Uses a pub/sub connection for
//! the envelope bus and a regular connection for the TTL-keyed sets/hashes,
//! matching the contract's "any backend with pub/sub + shared sets/hashes"
//! clause.

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::config::{RELAY_CHANNEL_TTL, RELAY_CONNECTION_TTL, RELAY_PRESENCE_TTL};
use crate::relay::{Envelope, Inbound, RelayAdapter, RelayError};

pub struct RedisRelay {
    server_id: String,
    key_prefix: String,
    client: redis::Client,
    bus_tx: broadcast::Sender<Envelope>,
}

impl RedisRelay {
    /// Connects to `redis_url` and spawns the background task that forwards
    /// pub/sub messages from the bus channel into a local `broadcast`
    /// channel every orchestrator task can subscribe to independently.
    pub async fn connect(
        redis_url: &str,
        server_id: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Result<std::sync::Arc<Self>, RelayError> {
        let server_id = server_id.into();
        let key_prefix = key_prefix.into();
        let client = redis::Client::open(redis_url)
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let (bus_tx, _rx) = broadcast::channel(1024);
        let relay = std::sync::Arc::new(RedisRelay {
            server_id,
            key_prefix,
            client,
            bus_tx,
        });

        relay.clone().spawn_subscriber().await?;
        Ok(relay)
    }

    fn bus_key(&self) -> String {
        format!("{}bus", self.key_prefix)
    }

    fn channel_key(&self, channel: &str) -> String {
        format!("{}channel:{channel}", self.key_prefix)
    }

    fn presence_key(&self, channel: &str) -> String {
        format!("{}presence:{channel}", self.key_prefix)
    }

    fn connection_key(&self, socket_id: &str) -> String {
        format!("{}connection:{socket_id}", self.key_prefix)
    }

    async fn spawn_subscriber(self: std::sync::Arc<Self>) -> Result<(), RelayError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        pubsub
            .subscribe(self.bus_key())
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let bus_tx = self.bus_tx.clone();
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                let Ok(payload): Result<String, _> = msg.get_payload() else {
                    continue;
                };
                if let Ok(envelope) = serde_json::from_str::<Envelope>(&payload) {
                    let _ = bus_tx.send(envelope);
                }
            }
        });
        Ok(())
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, RelayError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}

#[async_trait]
impl RelayAdapter for RedisRelay {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    async fn publish(&self, envelope: Envelope) -> Result<(), RelayError> {
        let mut conn = self.connection().await?;
        let payload =
            serde_json::to_string(&envelope).map_err(|e| RelayError::Transport(e.to_string()))?;
        conn.publish::<_, _, ()>(self.bus_key(), payload)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(())
    }

    fn subscribe(&self) -> Inbound {
        self.bus_tx.subscribe()
    }

    async fn store_channel(&self, channel: &str, socket_id: &str) -> Result<(), RelayError> {
        let mut conn = self.connection().await?;
        let key = self.channel_key(channel);
        conn.sadd::<_, _, ()>(&key, socket_id)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        conn.expire::<_, ()>(&key, RELAY_CHANNEL_TTL.as_secs() as i64)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn remove_channel(&self, channel: &str, socket_id: &str) -> Result<(), RelayError> {
        let mut conn = self.connection().await?;
        conn.srem::<_, _, ()>(self.channel_key(channel), socket_id)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    async fn channel_members(&self, channel: &str) -> Result<Vec<String>, RelayError> {
        let mut conn = self.connection().await?;
        conn.smembers(self.channel_key(channel))
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    async fn store_presence_member(
        &self,
        channel: &str,
        socket_id: &str,
        member: Value,
    ) -> Result<(), RelayError> {
        let mut conn = self.connection().await?;
        let key = self.presence_key(channel);
        let payload =
            serde_json::to_string(&member).map_err(|e| RelayError::Transport(e.to_string()))?;
        conn.hset::<_, _, _, ()>(&key, socket_id, payload)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        conn.expire::<_, ()>(&key, RELAY_PRESENCE_TTL.as_secs() as i64)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn remove_presence_member(&self, channel: &str, socket_id: &str) -> Result<(), RelayError> {
        let mut conn = self.connection().await?;
        conn.hdel::<_, _, ()>(self.presence_key(channel), socket_id)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    async fn presence_members(&self, channel: &str) -> Result<HashMap<String, Value>, RelayError> {
        let mut conn = self.connection().await?;
        let raw: HashMap<String, String> = conn
            .hgetall(self.presence_key(channel))
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(raw
            .into_iter()
            .filter_map(|(k, v)| serde_json::from_str(&v).ok().map(|value| (k, value)))
            .collect())
    }

    async fn store_connection(&self, socket_id: &str, snapshot: Value) -> Result<(), RelayError> {
        let mut conn = self.connection().await?;
        let key = self.connection_key(socket_id);
        let payload =
            serde_json::to_string(&snapshot).map_err(|e| RelayError::Transport(e.to_string()))?;
        conn.set_ex::<_, _, ()>(&key, payload, RELAY_CONNECTION_TTL.as_secs())
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    async fn remove_connection(&self, socket_id: &str) -> Result<(), RelayError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(self.connection_key(socket_id))
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    async fn health_check(&self) -> Result<(), RelayError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(())
    }
}
