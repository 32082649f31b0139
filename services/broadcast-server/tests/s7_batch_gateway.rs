mod support;

use std::collections::HashMap;
use std::sync::Arc;

use broadcast_core::authorizer::{AuthOutcome, AuthRule};
use broadcast_core::config::{HubConfig, LoadManagementConfig};
use serde_json::json;
use support::{connect, make_server};

fn allow_any() -> Arc<dyn AuthRule> {
    Arc::new(|_socket: String, _params: HashMap<String, String>, _token: Option<String>| async move {
        Ok(AuthOutcome::Allow)
    })
}

#[tokio::test]
async fn batch_subscribe_then_batch_unsubscribe_reports_every_channel_as_succeeded() {
    let (addr, _state) = make_server(HubConfig::default()).await;
    let mut client = connect(addr).await;

    client
        .send_json(&json!({
            "event": "batch_subscribe",
            "channels": ["news", "sports", "weather"],
            "messageId": "b1",
        }))
        .await
        .unwrap();
    let reply = client.recv_event("batch_subscribe_result").await.unwrap();
    assert_eq!(reply["messageId"], "b1");
    let succeeded: Vec<String> = serde_json::from_value(reply["data"]["succeeded"].clone()).unwrap();
    assert_eq!(succeeded, vec!["news", "sports", "weather"]);
    assert!(reply["data"]["failed"].as_object().unwrap().is_empty());

    client
        .send_json(&json!({
            "event": "batch_unsubscribe",
            "channels": ["news", "sports"],
            "messageId": "b2",
        }))
        .await
        .unwrap();
    let reply = client.recv_event("batch_unsubscribe_result").await.unwrap();
    let succeeded: Vec<String> = serde_json::from_value(reply["data"]["succeeded"].clone()).unwrap();
    assert_eq!(succeeded, vec!["news", "sports"]);
}

#[tokio::test]
async fn batch_subscribe_beyond_the_cap_fails_the_overflow_without_touching_it() {
    let config = HubConfig {
        load_management: LoadManagementConfig {
            max_batch_size: 2,
            ..LoadManagementConfig::default()
        },
        ..Default::default()
    };
    let (addr, _state) = make_server(config).await;
    let mut client = connect(addr).await;

    client
        .send_json(&json!({
            "event": "batch_subscribe",
            "channels": ["a", "b", "c"],
            "messageId": "b1",
        }))
        .await
        .unwrap();
    let reply = client.recv_event("batch_subscribe_result").await.unwrap();
    let succeeded: Vec<String> = serde_json::from_value(reply["data"]["succeeded"].clone()).unwrap();
    assert_eq!(succeeded, vec!["a", "b"]);
    assert!(reply["data"]["failed"]["c"].as_str().unwrap().contains("batch size"));
}

#[tokio::test]
async fn batch_broadcast_delivers_to_private_channel_subscribers_and_drops_on_public_ones() {
    let (addr, state) = make_server(HubConfig::default()).await;
    state.authorizer.register("private-orders", allow_any()).await.unwrap();

    let mut publisher = connect(addr).await;
    publisher.subscribe("news").await.unwrap();
    publisher.recv_event("subscription_succeeded").await.unwrap();
    publisher
        .send_json(&json!({"event": "subscribe", "channel": "private-orders"}))
        .await
        .unwrap();
    publisher.recv_event("subscription_succeeded").await.unwrap();

    let mut listener = connect(addr).await;
    listener.subscribe("news").await.unwrap();
    listener.recv_event("subscription_succeeded").await.unwrap();
    listener
        .send_json(&json!({"event": "subscribe", "channel": "private-orders"}))
        .await
        .unwrap();
    listener.recv_event("subscription_succeeded").await.unwrap();

    publisher
        .send_json(&json!({
            "event": "batch_broadcast",
            "messageId": "b1",
            "events": [
                {"channel": "news", "event": "client-headline", "data": {"text": "ignored"}},
                {"channel": "private-orders", "event": "client-shipped", "data": {"id": 42}},
            ],
        }))
        .await
        .unwrap();

    let shipped = listener.recv_event("client-shipped").await.unwrap();
    assert_eq!(shipped["data"]["id"], 42);

    let reply = publisher.recv_event("batch_broadcast_result").await.unwrap();
    let succeeded: Vec<String> = serde_json::from_value(reply["data"]["succeeded"].clone()).unwrap();
    assert_eq!(succeeded, vec!["news", "private-orders"]);

    // The public-channel item is reported as succeeded (it was a no-op, not a
    // validation failure) but never actually reaches the listener.
    listener
        .send_json(&json!({"event": "ping"}))
        .await
        .unwrap();
    let next = listener.recv_event("pong").await.unwrap();
    assert_eq!(next["event"], "pong");
}
