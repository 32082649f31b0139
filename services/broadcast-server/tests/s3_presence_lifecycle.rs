mod support;

use std::collections::HashMap;
use std::sync::Arc;

use broadcast_core::authorizer::{AuthOutcome, AuthRule};
use broadcast_core::config::HubConfig;
use broadcast_protocol::{PresenceId, PresenceMember};
use serde_json::json;
use support::{connect, make_server};

fn allow_as(id: &'static str) -> Arc<dyn AuthRule> {
    Arc::new(move |_socket: String, _params: HashMap<String, String>, _auth: Option<String>| async move {
        Ok(AuthOutcome::AllowAsPresence(PresenceMember {
            id: PresenceId::Str(id.to_owned()),
            info: json!({"name": id}),
        }))
    })
}

#[tokio::test]
async fn joining_member_sees_existing_roster_and_later_members_see_member_added() {
    let (addr, state) = make_server(HubConfig::default()).await;
    state.authorizer.register("presence-lobby", allow_as("alice")).await.unwrap();

    let mut alice = connect(addr).await;
    alice.subscribe("presence-lobby").await.unwrap();
    let reply = alice.recv_event("subscription_succeeded").await.unwrap();
    assert_eq!(reply["data"]["presence"]["count"], 1);

    state.authorizer.register("presence-lobby", allow_as("bob")).await.unwrap();
    let mut bob = connect(addr).await;
    bob.subscribe("presence-lobby").await.unwrap();
    let bob_reply = bob.recv_event("subscription_succeeded").await.unwrap();
    assert_eq!(bob_reply["data"]["presence"]["count"], 2);

    let member_added = alice.recv_event("member_added").await.unwrap();
    assert_eq!(member_added["channel"], "presence-lobby");
    assert_eq!(member_added["data"]["id"], "bob");
}

#[tokio::test]
async fn disconnecting_member_triggers_member_removed_for_remaining_subscribers() {
    let (addr, state) = make_server(HubConfig::default()).await;
    state.authorizer.register("presence-lobby", allow_as("alice")).await.unwrap();

    let mut alice = connect(addr).await;
    alice.subscribe("presence-lobby").await.unwrap();
    alice.recv_event("subscription_succeeded").await.unwrap();

    state.authorizer.register("presence-lobby", allow_as("bob")).await.unwrap();
    let mut bob = connect(addr).await;
    bob.subscribe("presence-lobby").await.unwrap();
    bob.recv_event("subscription_succeeded").await.unwrap();
    alice.recv_event("member_added").await.unwrap();

    bob.close().await.unwrap();

    let removed = alice.recv_event("member_removed").await.unwrap();
    assert_eq!(removed["channel"], "presence-lobby");
}
