mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use broadcast_core::authorizer::{AuthOutcome, AuthRule};
use broadcast_core::config::HubConfig;
use broadcast_core::relay::InMemoryRelay;
use serde_json::json;
use support::{connect, spawn_node};

fn allow_any() -> Arc<dyn AuthRule> {
    Arc::new(|_socket: String, _params: HashMap<String, String>, _token: Option<String>| async move {
        Ok(AuthOutcome::Allow)
    })
}

#[tokio::test]
async fn a_node_never_redelivers_its_own_published_event_via_the_relay() {
    let relay = InMemoryRelay::standalone("node-a");
    let (addr, state) = spawn_node(HubConfig::default(), relay, "node-a".to_owned()).await;
    state.authorizer.register("private-orders", allow_any()).await.unwrap();

    let mut subscriber = connect(addr).await;
    subscriber.subscribe("private-orders").await.unwrap();
    subscriber.recv_event("subscription_succeeded").await.unwrap();

    let mut publisher = connect(addr).await;
    publisher.subscribe("private-orders").await.unwrap();
    publisher.recv_event("subscription_succeeded").await.unwrap();
    publisher
        .send_json(&json!({"event": "client-placed", "channel": "private-orders", "data": {"id": 1}}))
        .await
        .unwrap();

    let first = subscriber.recv_event("client-placed").await.unwrap();
    assert_eq!(first["data"]["id"], 1);

    // The relay listener re-runs every envelope this node publishes through
    // `broadcast_local` again unless the loopback guard drops it first; if
    // that guard were missing, the subscriber would see the event twice.
    let duplicate = tokio::time::timeout(Duration::from_millis(150), subscriber.recv_event("client-placed")).await;
    assert!(duplicate.is_err(), "event must not be delivered a second time via the relay loop");
}
