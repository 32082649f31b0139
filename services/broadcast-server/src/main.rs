use std::env;
use std::time::Duration;

use broadcast_core::config::{
    AckConfig, AuthConfig, ConnectionConfig, DedupConfig, HeartbeatConfig, HubConfig,
    LoadManagementConfig, PersistenceConfig, RateLimitConfig, SecurityConfig, WebhookConfig,
};
use broadcast_core::relay::RelayAdapter;
use broadcast_core::relay_redis::RedisRelay;
use broadcast_server::{hub, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:6001".to_owned());
    let config = config_from_env();

    let state = match env::var("REDIS_URL") {
        Ok(redis_url) => {
            let server_id = Uuid::new_v4().to_string();
            let relay: std::sync::Arc<dyn RelayAdapter> =
                RedisRelay::connect(&redis_url, server_id.clone(), config.relay.key_prefix.clone())
                    .await
                    .expect("failed to connect to redis relay");
            info!(%server_id, "connected to redis relay, running as part of a fleet");
            AppState::with_relay(config, relay, server_id)
        }
        Err(_) => {
            info!("REDIS_URL not set, running as a single standalone node");
            AppState::new(config)
        }
    };
    tokio::spawn(hub::run_relay_listener(state.clone()));
    tokio::spawn(hub::run_sweepers(state.clone()));

    let router = broadcast_server::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "broadcast hub listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("broadcast hub shut down gracefully");
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Builds a [`HubConfig`] from the process environment, falling back to each
/// sub-config's typed default. Uses a plain `env::var(..).unwrap_or_else(..)`
/// style rather than a config-file parser, since no format for one has been
/// chosen yet (see DESIGN.md).
fn config_from_env() -> HubConfig {
    let mut connection = ConnectionConfig::default();
    connection.host = env::var("HOST").unwrap_or(connection.host);
    connection.port = env_usize("PORT", connection.port as usize) as u16;
    connection.idle_timeout = env_secs("IDLE_TIMEOUT_SECS", connection.idle_timeout);
    connection.max_payload_length = env_usize("MAX_PAYLOAD_LENGTH", connection.max_payload_length);

    let mut auth = AuthConfig::default();
    auth.enabled = env_bool("AUTH_ENABLED", auth.enabled);

    let mut rate_limit = RateLimitConfig::default();
    rate_limit.max = env_usize("RATE_LIMIT_MAX", rate_limit.max as usize) as u32;
    rate_limit.per_channel = env_bool("RATE_LIMIT_PER_CHANNEL", rate_limit.per_channel);
    rate_limit.per_user = env_bool("RATE_LIMIT_PER_USER", rate_limit.per_user);

    let mut security = SecurityConfig::default();
    security.max_payload_size = env_usize("MAX_PAYLOAD_SIZE", security.max_payload_size);
    security.sanitize_messages = env_bool("SANITIZE_MESSAGES", security.sanitize_messages);

    let mut acknowledgments = AckConfig::default();
    acknowledgments.enabled = env_bool("ACK_ENABLED", acknowledgments.enabled);

    let mut heartbeat = HeartbeatConfig::default();
    heartbeat.enabled = env_bool("HEARTBEAT_ENABLED", heartbeat.enabled);

    let mut webhooks = WebhookConfig::default();
    webhooks.enabled = env_bool("WEBHOOKS_ENABLED", webhooks.enabled);

    let mut persistence = PersistenceConfig::default();
    persistence.enabled = env_bool("PERSISTENCE_ENABLED", persistence.enabled);

    let mut deduplication = DedupConfig::default();
    deduplication.enabled = env_bool("DEDUP_ENABLED", deduplication.enabled);

    let mut load_management = LoadManagementConfig::default();
    load_management.max_connections = env_usize("MAX_CONNECTIONS", load_management.max_connections);
    load_management.max_channels_per_connection = env_usize(
        "MAX_CHANNELS_PER_CONNECTION",
        load_management.max_channels_per_connection,
    );
    load_management.max_global_channels = env_usize("MAX_GLOBAL_CHANNELS", load_management.max_global_channels);

    HubConfig {
        connection,
        auth,
        rate_limit,
        security,
        acknowledgments,
        heartbeat,
        webhooks,
        persistence,
        deduplication,
        load_management,
        ..Default::default()
    }
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
