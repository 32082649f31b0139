mod support;

use std::time::Duration;

use broadcast_core::config::{HubConfig, RateLimitConfig};
use serde_json::json;
use support::{connect, make_server};

fn config_with_tight_limit() -> HubConfig {
    HubConfig {
        rate_limit: RateLimitConfig {
            max: 2,
            window: Duration::from_secs(60),
            per_channel: false,
            per_user: false,
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn exceeding_the_per_socket_limit_yields_an_error_with_retry_after() {
    let (addr, _state) = make_server(config_with_tight_limit()).await;
    let mut client = connect(addr).await;

    client.send_json(&json!({"event": "ping"})).await.unwrap();
    client.recv_event("pong").await.unwrap();
    client.send_json(&json!({"event": "ping"})).await.unwrap();
    client.recv_event("pong").await.unwrap();

    client.send_json(&json!({"event": "ping"})).await.unwrap();
    let reply = client.recv_event("error").await.unwrap();
    assert_eq!(reply["data"]["type"], "RateLimitExceeded");
    assert!(reply["data"]["retryAfter"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn each_socket_has_an_independent_window() {
    let (addr, _state) = make_server(config_with_tight_limit()).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;

    a.send_json(&json!({"event": "ping"})).await.unwrap();
    a.recv_event("pong").await.unwrap();
    a.send_json(&json!({"event": "ping"})).await.unwrap();
    a.recv_event("pong").await.unwrap();

    // b's window is untouched, so it should still be allowed.
    b.send_json(&json!({"event": "ping"})).await.unwrap();
    b.recv_event("pong").await.unwrap();
}
