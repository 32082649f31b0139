use std::net::SocketAddr;
use std::sync::Arc;

use broadcast_core::config::HubConfig;
use broadcast_core::relay::{InMemoryRelay, RelayAdapter};
use broadcast_server::AppState;
use broadcast_test_utils::MockWsClient;
use tokio::sync::broadcast as tokio_broadcast;

/// Binds an ephemeral port, spawns the router, and returns the listening
/// address plus the shared state so a test can assert on it directly
/// instead of only through the wire.
pub async fn make_server(config: HubConfig) -> (SocketAddr, Arc<AppState>) {
    let state = AppState::new(config);
    let router = broadcast_server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

/// Binds a node with the given relay adapter, spawns its relay listener and
/// HTTP/WS router, and returns the listening address plus the shared state.
/// Used by the multi-node scenarios, where a single `make_server` standalone
/// node isn't enough.
pub async fn spawn_node(config: HubConfig, relay: Arc<dyn RelayAdapter>, server_id: String) -> (SocketAddr, Arc<AppState>) {
    let state = AppState::with_relay(config, relay, server_id);
    tokio::spawn(broadcast_server::hub::run_relay_listener(state.clone()));

    let router = broadcast_server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

/// Spawns two nodes sharing one in-process relay bus, simulating a fleet
/// without needing an external Redis instance.
pub async fn spawn_two_node_fleet(config: HubConfig) -> ((SocketAddr, Arc<AppState>), (SocketAddr, Arc<AppState>)) {
    let bus: tokio_broadcast::Sender<broadcast_core::relay::Envelope> = InMemoryRelay::shared_bus();
    let relay_a = InMemoryRelay::with_bus("node-a", bus.clone());
    let relay_b = InMemoryRelay::with_bus("node-b", bus);

    let node_a = spawn_node(config.clone(), relay_a, "node-a".to_owned()).await;
    let node_b = spawn_node(config, relay_b, "node-b".to_owned()).await;
    (node_a, node_b)
}

pub async fn connect(addr: SocketAddr) -> MockWsClient {
    MockWsClient::connect(&format!("ws://{addr}/app"))
        .await
        .expect("connect")
}
