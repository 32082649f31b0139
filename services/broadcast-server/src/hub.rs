//! The server orchestrator: broadcast fan-out, the relay
//! listener task, and the subscribe path shared by the single and batch
//! gateways. Everything here is a thin coordination layer over the
//! `broadcast-core` components held in [`AppState`]; it owns no state of
//! its own beyond what it borrows from there.

use std::sync::Arc;
use std::time::Duration;

use broadcast_core::ack::{AckResult, Acknowledger};
use broadcast_core::authorizer::AuthOutcome;
use broadcast_core::channel::{ChannelRegistry, SubscribeOutcome};
use broadcast_core::connection::ConnectionHandle;
use broadcast_core::error::CoreError;
use broadcast_core::events::LifecycleEvent;
use broadcast_core::load::Admission;
use broadcast_core::relay::{next_remote_envelope, Envelope};
use broadcast_protocol::{ChannelClass, ServerFrame};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Fans `event` out to every local subscriber of `channel` except
/// `exclude`, then hands the same triple to the relay adapter so other
/// nodes in the fleet deliver it to their own local subscribers.
pub async fn broadcast(state: &AppState, channel: &str, event: &str, data: Value, exclude: Option<&str>) {
    broadcast_local(state, channel, event, &data, exclude).await;

    let envelope = Envelope::broadcast(
        channel.to_owned(),
        event.to_owned(),
        data.clone(),
        exclude.map(str::to_owned),
        state.server_id.clone(),
    );
    if let Err(err) = state.relay.publish(envelope).await {
        warn!(channel, event, error = %err, "relay publish failed");
    }

    if let Some(store) = &state.persistence {
        store.store(channel, event, data.clone(), exclude.map(str::to_owned)).await;
    }
    state.webhooks.emit(event, &data, webhook_timestamp(), &state.breakers).await;
}

fn webhook_timestamp() -> i64 {
    // `SystemTime::now()` rather than the forbidden `Date.now()`-style
    // nondeterministic host calls this crate otherwise avoids; webhook
    // bodies are the one place a wall-clock timestamp is part of the wire
    // contract.
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Presence membership changes still need to reach an otherwise-throttled
/// socket so its view of who's in the channel stays correct.
fn is_presence_event(event: &str) -> bool {
    matches!(event, "member_added" | "member_removed")
}

/// Delivers `event` to every connection currently subscribed to `channel`
/// on this node, skipping `exclude`. Used both for direct client broadcasts
/// and to re-run a received relay envelope locally (never re-published).
/// Suppresses delivery to any subscriber whose outbox is already over the
/// backpressure threshold, except for presence events, which always go
/// through.
pub async fn broadcast_local(state: &AppState, channel: &str, event: &str, data: &Value, exclude: Option<&str>) {
    for socket_id in state.channels.subscriber_ids(channel).await {
        if Some(socket_id.as_str()) == exclude {
            continue;
        }
        let Some(connection) = state.connections.get(&socket_id).await else {
            continue;
        };
        if !is_presence_event(event) && state.load.is_backpressured(connection.outbox_bytes()) {
            continue;
        }
        let mut frame = ServerFrame::new(event.to_owned())
            .with_channel(channel.to_owned())
            .with_data(data.clone());

        if state.config.acknowledgments.enabled {
            let message_id = Uuid::new_v4().to_string();
            frame = frame.with_message_id(message_id.clone());
            let _ = connection.send(frame.clone()).await;
            spawn_ack_delivery(
                state.acknowledger.clone(),
                connection,
                frame,
                message_id,
                state.config.acknowledgments.timeout,
                state.config.acknowledgments.retry_attempts,
            );
        } else {
            let _ = connection.send(frame).await;
        }
    }
}

/// Drives the redelivery loop for one recipient: re-sends the
/// same frame before each retry attempt after the first, giving up once
/// `retry_attempts` per-attempt timeouts have elapsed with no `ack`.
/// Runs detached from the broadcaster so a slow/unresponsive client never
/// delays fan-out to the rest of the channel.
fn spawn_ack_delivery(
    acknowledger: Arc<Acknowledger>,
    connection: Arc<ConnectionHandle>,
    frame: ServerFrame,
    message_id: String,
    attempt_timeout: std::time::Duration,
    retry_attempts: u32,
) {
    tokio::spawn(async move {
        let attempts = retry_attempts.max(1);
        for attempt in 1..=attempts {
            if attempt > 1 {
                let _ = connection.send(frame.clone()).await;
            }
            if acknowledger.await_ack(&message_id, attempt_timeout).await == AckResult::Acked {
                return;
            }
        }
        warn!(
            message_id = %message_id,
            attempts,
            "giving up on unacknowledged delivery after {attempts} attempts"
        );
    });
}

/// Background task: drains the relay's inbound stream (already loopback
/// filtered) and re-runs each envelope as a local broadcast. Exactly one of
/// these runs per node, never one per connection.
pub async fn run_relay_listener(state: Arc<AppState>) {
    let mut inbound = state.relay.subscribe();
    loop {
        match next_remote_envelope(&mut inbound, &state.server_id).await {
            Some(envelope) => {
                broadcast_local(
                    &state,
                    &envelope.channel,
                    &envelope.event,
                    &envelope.data,
                    envelope.socket_id.as_deref(),
                )
                .await;
            }
            None => {
                info!("relay inbound stream closed, relay listener exiting");
                break;
            }
        }
    }
}

/// Runs the subscribe path shared by the single-channel and batch gateways:
/// admission checks, authorization, registry update, presence tracking,
/// relay state replication, and lifecycle/member_added side effects. Callers
/// differ only in how they report the outcome to the client.
pub async fn subscribe_channel(
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
    channel: &str,
    auth_token: Option<&str>,
) -> Result<SubscribeOutcome, CoreError> {
    let class = ChannelRegistry::channel_type(channel);

    if state.load.admit_connection_channel(handle.channel_count().await) != Admission::Accept {
        return Err(CoreError::Capacity(
            "per-connection channel limit reached".to_owned(),
        ));
    }
    if !state.channels.channel_exists(channel).await && state.load.admit_global_channel() != Admission::Accept {
        return Err(CoreError::Capacity("global channel limit reached".to_owned()));
    }

    let member = if class.requires_authorization() {
        match state.authorizer.authorize(&handle.socket_id, channel, auth_token).await {
            Ok(AuthOutcome::Allow) => None,
            Ok(AuthOutcome::AllowAsPresence(member)) => Some(member),
            Ok(AuthOutcome::Deny) => return Err(CoreError::Auth("authorization denied".to_owned())),
            Err(err) => return Err(err),
        }
    } else {
        None
    };

    let channel_existed = state.channels.channel_exists(channel).await;
    let outcome = state.channels.subscribe(channel, &handle.socket_id, member.clone()).await;
    handle.note_channel(channel).await;
    if !channel_existed {
        state.load.channel_created();
    }

    if let Err(err) = state.relay.store_channel(channel, &handle.socket_id).await {
        warn!(channel, error = %err, "relay store_channel failed");
    }

    if let Some(member) = &member {
        state
            .presence_heartbeat
            .track(channel, &handle.socket_id, member.clone())
            .await;
        if let Ok(member_json) = serde_json::to_value(member) {
            if let Err(err) = state
                .relay
                .store_presence_member(channel, &handle.socket_id, member_json)
                .await
            {
                warn!(channel, error = %err, "relay store_presence_member failed");
            }
        }
    }

    if outcome.channel_created {
        state
            .events
            .emit(LifecycleEvent::Created { channel: channel.to_owned() })
            .await;
    }
    state
        .events
        .emit(LifecycleEvent::Subscribed {
            channel: channel.to_owned(),
            socket_id: handle.socket_id.clone(),
        })
        .await;

    if let Some(member) = &member {
        let payload = serde_json::to_value(member).unwrap_or(Value::Null);
        broadcast(state, channel, "member_added", payload, Some(&handle.socket_id)).await;
    }

    Ok(outcome)
}

/// Runs the unsubscribe path shared by the single-channel and batch
/// gateways, mirroring [`subscribe_channel`]'s side effects in reverse.
pub async fn unsubscribe_channel(state: &AppState, handle: &Arc<ConnectionHandle>, channel: &str) {
    let outcome = state.channels.unsubscribe(channel, &handle.socket_id).await;
    handle.forget_channel(channel).await;

    let was_presence = outcome.presence.is_some();
    if was_presence {
        state.presence_heartbeat.untrack(channel, &handle.socket_id).await;
        if let Err(err) = state.relay.remove_presence_member(channel, &handle.socket_id).await {
            warn!(channel, error = %err, "relay remove_presence_member failed");
        }
    }
    if let Err(err) = state.relay.remove_channel(channel, &handle.socket_id).await {
        warn!(channel, error = %err, "relay remove_channel failed");
    }

    state
        .events
        .emit(LifecycleEvent::Unsubscribed {
            channel: channel.to_owned(),
            socket_id: handle.socket_id.clone(),
        })
        .await;

    if was_presence {
        broadcast(
            state,
            channel,
            "member_removed",
            json!({"socket_id": handle.socket_id}),
            Some(&handle.socket_id),
        )
        .await;
    }

    if outcome.channel_destroyed {
        state.load.channel_destroyed();
        state
            .events
            .emit(LifecycleEvent::Empty { channel: channel.to_owned() })
            .await;
        state
            .events
            .emit(LifecycleEvent::Destroyed { channel: channel.to_owned() })
            .await;
    }
}

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Background task: periodically reclaims expired rate-limit buckets, dedup
/// entries, and silent presence members (broadcasting `member_removed` for
/// the latter), none of which clean themselves up without a lookup.
pub async fn run_sweepers(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        state.rate_limiter.sweep().await;
        if let Some(dedup) = &state.dedup {
            dedup.sweep().await;
        }

        let evicted = state
            .presence_heartbeat
            .sweep(state.config.heartbeat.timeout)
            .await;
        for (channel, socket_id, _member) in evicted {
            if let Some(connection) = state.connections.get(&socket_id).await {
                unsubscribe_channel(&state, &connection, &channel).await;
            }
        }
    }
}

/// Cleans up everything tied to a closing connection: every channel it was
/// subscribed to, the connection table entry, and the load counter.
pub async fn disconnect(state: &AppState, handle: &Arc<ConnectionHandle>) {
    for channel in handle.channels().await {
        unsubscribe_channel(state, handle, &channel).await;
    }
    state.connections.remove(&handle.socket_id).await;
    state.load.connection_closed();
    if let Err(err) = state.relay.remove_connection(&handle.socket_id).await {
        warn!(socket_id = %handle.socket_id, error = %err, "relay remove_connection failed");
    }
}
