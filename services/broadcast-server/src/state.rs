use std::sync::Arc;

use broadcast_core::ack::Acknowledger;
use broadcast_core::authorizer::Authorizer;
use broadcast_core::breaker::CircuitBreakerRegistry;
use broadcast_core::channel::ChannelRegistry;
use broadcast_core::config::HubConfig;
use broadcast_core::connection::ConnectionTable;
use broadcast_core::dedup::DedupCache;
use broadcast_core::events::EventBus;
use broadcast_core::load::LoadManager;
use broadcast_core::persistence::PersistenceStore;
use broadcast_core::presence_heartbeat::PresenceHeartbeat;
use broadcast_core::rate_limit::RateLimiter;
use broadcast_core::relay::{InMemoryRelay, RelayAdapter};
use broadcast_core::validate::ValidatorChain;
use broadcast_core::webhook::WebhookEmitter;
use uuid::Uuid;

/// Everything the orchestrator wires A-Q into. Held behind a single `Arc`
/// so axum's `State` extractor stays cheap to clone per request/connection.
pub struct AppState {
    pub config: HubConfig,
    pub server_id: String,
    pub connections: ConnectionTable,
    pub channels: ChannelRegistry,
    pub authorizer: Authorizer,
    pub relay: Arc<dyn RelayAdapter>,
    pub rate_limiter: RateLimiter,
    pub load: LoadManager,
    pub acknowledger: Arc<Acknowledger>,
    pub dedup: Option<DedupCache>,
    pub breakers: CircuitBreakerRegistry,
    pub persistence: Option<PersistenceStore>,
    pub presence_heartbeat: PresenceHeartbeat,
    pub webhooks: WebhookEmitter,
    pub events: EventBus,
    pub validators: ValidatorChain,
}

impl AppState {
    pub fn new(config: HubConfig) -> Arc<Self> {
        let server_id = Uuid::new_v4().to_string();
        let relay = InMemoryRelay::standalone(server_id.clone());
        Self::with_relay(config, relay, server_id)
    }

    pub fn with_relay(config: HubConfig, relay: Arc<dyn RelayAdapter>, server_id: String) -> Arc<Self> {
        let persistence = if config.persistence.enabled {
            Some(PersistenceStore::new(
                config.persistence.ttl,
                config.persistence.max_messages,
                config.persistence.exclude_events.clone(),
            ))
        } else {
            None
        };

        let dedup = if config.deduplication.enabled {
            Some(DedupCache::new(config.deduplication.ttl, config.deduplication.max_size))
        } else {
            None
        };

        Arc::new(AppState {
            rate_limiter: RateLimiter::new(config.rate_limit.max, config.rate_limit.window),
            load: LoadManager::new(config.load_management.clone()),
            breakers: CircuitBreakerRegistry::new(config.circuit_breaker.clone()),
            webhooks: WebhookEmitter::new(config.webhooks.clone()),
            persistence,
            acknowledger: Arc::new(Acknowledger::new()),
            dedup,
            presence_heartbeat: PresenceHeartbeat::new(),
            events: EventBus::new(),
            validators: ValidatorChain::new(),
            connections: ConnectionTable::new(),
            channels: ChannelRegistry::new(),
            authorizer: Authorizer::new(),
            relay,
            server_id,
            config,
        })
    }

    pub async fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "connections": self.connections.len().await,
            "channels": self.channels.channel_count().await,
            "pending_acks": self.acknowledger.pending_count().await,
            "dedup_entries": match &self.dedup {
                Some(dedup) => dedup.len().await,
                None => 0,
            },
            "rate_limited_keys": self.rate_limiter.tracked_keys().await,
            "server_id": self.server_id,
        })
    }
}
