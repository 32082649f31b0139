//! Typed configuration sub-records. Each subsystem owns its own
//! config type with typed defaults; the outer CLI launcher (out of core) is
//! responsible for parsing a config *file* into these structs. `AppState::new`
//! takes already-constructed dependencies rather than raw connection strings.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub idle_timeout: Duration,
    pub max_payload_length: usize,
    pub backpressure_limit: usize,
    pub close_on_backpressure_limit: bool,
    pub send_pings: bool,
    pub publish_to_self: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            host: "0.0.0.0".to_owned(),
            port: 6001,
            idle_timeout: Duration::from_secs(120),
            max_payload_length: 64 * 1024,
            backpressure_limit: 1024 * 1024,
            close_on_backpressure_limit: false,
            send_pings: true,
            publish_to_self: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: u32,
    pub key_prefix: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            host: "127.0.0.1".to_owned(),
            port: 6379,
            password: None,
            database: 0,
            key_prefix: "broadcasting:".to_owned(),
        }
    }
}

pub const RELAY_CHANNEL_TTL: Duration = Duration::from_secs(3600);
pub const RELAY_PRESENCE_TTL: Duration = Duration::from_secs(3600);
pub const RELAY_CONNECTION_TTL: Duration = Duration::from_secs(7200);

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub enabled: bool,
    pub cookie: CookieConfig,
    pub jwt: JwtConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            enabled: false,
            cookie: CookieConfig {
                name: "hub_session".to_owned(),
                secure: true,
            },
            jwt: JwtConfig {
                secret: String::new(),
                algorithm: "HS256".to_owned(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max: u32,
    pub window: Duration,
    pub per_channel: bool,
    pub per_user: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            max: 100,
            window: Duration::from_millis(1000),
            per_channel: false,
            per_user: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
    pub credentials: bool,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub cors: CorsConfig,
    pub max_payload_size: usize,
    pub sanitize_messages: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            cors: CorsConfig {
                enabled: true,
                origins: vec!["*".to_owned()],
                credentials: false,
            },
            max_payload_size: 64 * 1024,
            sanitize_messages: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AckConfig {
    pub enabled: bool,
    pub timeout: Duration,
    pub retry_attempts: u32,
}

impl Default for AckConfig {
    fn default() -> Self {
        AckConfig {
            enabled: false,
            timeout: Duration::from_millis(5000),
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
    pub require_client_heartbeat: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        HeartbeatConfig {
            enabled: true,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
            require_client_heartbeat: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookEndpointConfig {
    pub url: String,
    pub events: Vec<String>,
    pub headers: Vec<(String, String)>,
    pub method: String,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub endpoints: Vec<WebhookEndpointConfig>,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            enabled: false,
            endpoints: Vec::new(),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(5),
            secret: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_messages: usize,
    pub exclude_events: Vec<String>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            enabled: false,
            ttl: Duration::from_secs(24 * 3600),
            max_messages: 100,
            exclude_events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_size: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            enabled: true,
            ttl: Duration::from_secs(60),
            max_size: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadManagementConfig {
    pub max_connections: usize,
    pub max_channels_per_connection: usize,
    pub max_global_channels: usize,
    pub shed_load_at: f64,
    pub backpressure_threshold: usize,
    pub max_batch_size: usize,
}

impl Default for LoadManagementConfig {
    fn default() -> Self {
        LoadManagementConfig {
            max_connections: 10_000,
            max_channels_per_connection: 100,
            max_global_channels: 100_000,
            shed_load_at: 0.90,
            backpressure_threshold: 1024 * 1024,
            max_batch_size: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub failure_window: Duration,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Root config tree, constructed by the (out-of-core) CLI launcher and
/// handed to the orchestrator already-typed.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    pub connection: ConnectionConfig,
    pub relay: RelayConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub security: SecurityConfig,
    pub acknowledgments: AckConfig,
    pub heartbeat: HeartbeatConfig,
    pub webhooks: WebhookConfig,
    pub persistence: PersistenceConfig,
    pub deduplication: DedupConfig,
    pub load_management: LoadManagementConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}
