mod support;

use std::collections::HashMap;
use std::sync::Arc;

use broadcast_core::authorizer::{AuthOutcome, AuthRule};
use broadcast_core::config::HubConfig;
use serde_json::json;
use support::{connect, spawn_two_node_fleet};

fn allow_any() -> Arc<dyn AuthRule> {
    Arc::new(|_socket: String, _params: HashMap<String, String>, _token: Option<String>| async move {
        Ok(AuthOutcome::Allow)
    })
}

#[tokio::test]
async fn event_published_on_one_node_reaches_a_subscriber_on_another() {
    let ((addr_a, state_a), (addr_b, state_b)) = spawn_two_node_fleet(HubConfig::default()).await;
    state_a.authorizer.register("private-orders", allow_any()).await.unwrap();
    state_b.authorizer.register("private-orders", allow_any()).await.unwrap();

    let mut subscriber_on_b = connect(addr_b).await;
    subscriber_on_b.subscribe("private-orders").await.unwrap();
    subscriber_on_b.recv_event("subscription_succeeded").await.unwrap();

    let mut publisher_on_a = connect(addr_a).await;
    publisher_on_a.subscribe("private-orders").await.unwrap();
    publisher_on_a.recv_event("subscription_succeeded").await.unwrap();
    publisher_on_a
        .send_json(&json!({"event": "client-placed", "channel": "private-orders", "data": {"id": 7}}))
        .await
        .unwrap();

    let relayed = subscriber_on_b.recv_event("client-placed").await.unwrap();
    assert_eq!(relayed["channel"], "private-orders");
    assert_eq!(relayed["data"]["id"], 7);
}

#[tokio::test]
async fn presence_member_added_on_one_node_is_visible_to_a_subscriber_on_another() {
    use broadcast_protocol::{PresenceId, PresenceMember};

    fn allow_as(id: &'static str) -> Arc<dyn AuthRule> {
        Arc::new(move |_s: String, _p: HashMap<String, String>, _a: Option<String>| async move {
            Ok(AuthOutcome::AllowAsPresence(PresenceMember {
                id: PresenceId::Str(id.to_owned()),
                info: json!({"name": id}),
            }))
        })
    }

    let ((addr_a, state_a), (addr_b, state_b)) = spawn_two_node_fleet(HubConfig::default()).await;
    state_a.authorizer.register("presence-lobby", allow_as("alice")).await.unwrap();
    state_b.authorizer.register("presence-lobby", allow_as("bob")).await.unwrap();

    let mut alice = connect(addr_a).await;
    alice.subscribe("presence-lobby").await.unwrap();
    alice.recv_event("subscription_succeeded").await.unwrap();

    let mut bob = connect(addr_b).await;
    bob.subscribe("presence-lobby").await.unwrap();
    bob.recv_event("subscription_succeeded").await.unwrap();

    let member_added = alice.recv_event("member_added").await.unwrap();
    assert_eq!(member_added["data"]["id"], "bob");
}
