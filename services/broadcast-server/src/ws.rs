//! WebSocket upgrade handler and the per-connection task implementing the
//! frame dispatch table. Grounded on the forwarder socket
//! loop's admit-then-hello-then-select! shape, generalized from a single
//! bespoke handshake to the subscribe/unsubscribe/batch/ack/client-event
//! frame table this hub speaks instead.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use broadcast_core::batch::run_batch;
use broadcast_core::connection::ConnectionHandle;
use broadcast_core::error::CoreError;
use broadcast_core::load::Admission;
use broadcast_core::rate_limit::{self, Decision};
use broadcast_core::validate::sanitize;
use broadcast_protocol::{
    frame, BatchBroadcastFrame, BatchBroadcastItem, BatchSubscribeFrame, BatchUnsubscribeFrame, ChannelClass,
    ClientEventFrame, ClientFrameKind, HeartbeatFrame, ServerFrame,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::warn;
use uuid::Uuid;

use crate::hub;
use crate::state::AppState;

const OUTBOX_CAPACITY: usize = 256;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> axum::response::Response {
    if state.load.admit_connection() != Admission::Accept {
        return crate::http::response::too_many_requests("server at capacity").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state)).into_response()
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    if state.load.admit_connection() != Admission::Accept {
        close_with(&mut socket, 1008, "server at capacity").await;
        return;
    }

    let socket_id = Uuid::new_v4().to_string();
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<ServerFrame>(OUTBOX_CAPACITY);
    let handle = Arc::new(ConnectionHandle::new(socket_id.clone(), None, outbox_tx));
    state.connections.insert(handle.clone()).await;
    state.load.connection_opened();
    if let Err(err) = state
        .relay
        .store_connection(&socket_id, json!({"server_id": state.server_id}))
        .await
    {
        warn!(socket_id = %socket_id, error = %err, "relay store_connection failed");
    }

    let established = ServerFrame::new("connection_established").with_data(json!({
        "socket_id": socket_id,
        "activity_timeout": state.config.connection.idle_timeout.as_secs(),
    }));
    if socket.send(Message::Text(established.to_json().into())).await.is_err() {
        hub::disconnect(&state, &handle).await;
        return;
    }

    let idle_timeout = state.config.connection.idle_timeout;
    let mut heartbeat = interval(state.config.heartbeat.interval);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            incoming = tokio::time::timeout(idle_timeout, socket.recv()) => {
                match incoming {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        handle.touch().await;
                        if dispatch_text(&state, &handle, &text).await.is_break() {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Ping(payload)))) => {
                        handle.touch().await;
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Pong(_)))) => {
                        handle.touch().await;
                    }
                    Ok(Some(Ok(Message::Binary(_)))) => {}
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                    Ok(Some(Err(_))) => break,
                    Err(_) => {
                        warn!(socket_id = %socket_id, "connection idle timeout, closing");
                        break;
                    }
                }
            }
            frame = outbox_rx.recv() => {
                match frame {
                    Some(frame) => {
                        let byte_len = frame.byte_len();
                        let sent = socket.send(Message::Text(frame.to_json().into())).await.is_ok();
                        handle.outbox_drained(byte_len);
                        if !sent {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = heartbeat.tick(), if state.config.heartbeat.enabled => {
                if socket.send(Message::Text(ServerFrame::new("ping").to_json().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    hub::disconnect(&state, &handle).await;
}

/// Decodes and dispatches one inbound text frame per the dispatch table. Returns
/// `ControlFlow::Break` when the connection should be torn down (reserved
/// for future fatal-protocol-error cases; no current path takes it, but the
/// per-frame handlers below are not expected to ever request it).
async fn dispatch_text(state: &AppState, handle: &Arc<ConnectionHandle>, text: &str) -> ControlFlow<()> {
    let parsed = match frame::parse(text, state.config.security.max_payload_size) {
        Ok(parsed) => parsed,
        Err(err) => {
            let _ = handle.send(error_frame(&CoreError::Validation(err.to_string()), None)).await;
            return ControlFlow::Continue(());
        }
    };

    let rate_limit_user_id = state.config.rate_limit.per_user.then(|| handle.user_id.as_deref()).flatten();
    let rl_key = rate_limit::key(
        &handle.socket_id,
        rate_limit_user_id,
        None,
        state.config.rate_limit.per_channel,
    );
    if let Decision::Deny { retry_after_ms } = state.rate_limiter.check(&rl_key).await {
        let _ = handle
            .send(error_frame(
                &CoreError::RateLimitExceeded { retry_after_ms },
                Some(retry_after_ms),
            ))
            .await;
        return ControlFlow::Continue(());
    }

    if parsed.wants_ack {
        if let Some(message_id) = &parsed.message_id {
            let _ = handle.send(ServerFrame::new("ack").with_message_id(message_id.clone())).await;
        }
    }

    match parsed.kind {
        ClientFrameKind::Subscribe(sub) => {
            match hub::subscribe_channel(state, handle, &sub.channel, sub.auth.as_deref()).await {
                Ok(outcome) => {
                    let mut reply = ServerFrame::new("subscription_succeeded").with_channel(sub.channel);
                    if let Some(presence) = &outcome.presence {
                        reply = reply.with_data(json!({"presence": presence}));
                    }
                    let _ = handle.send(reply).await;
                }
                Err(err) => {
                    let _ = handle.send(subscription_error_frame(&sub.channel, &err)).await;
                }
            }
        }
        ClientFrameKind::Unsubscribe(unsub) => {
            hub::unsubscribe_channel(state, handle, &unsub.channel).await;
        }
        ClientFrameKind::BatchSubscribe(batch) => handle_batch_subscribe(state, handle, batch).await,
        ClientFrameKind::BatchUnsubscribe(batch) => handle_batch_unsubscribe(state, handle, batch).await,
        ClientFrameKind::BatchBroadcast(batch) => handle_batch_broadcast(state, handle, batch).await,
        ClientFrameKind::Ping => {
            let _ = handle.send(ServerFrame::new("pong")).await;
        }
        ClientFrameKind::Heartbeat(hb) => handle_heartbeat(state, handle, hb).await,
        ClientFrameKind::Ack(ack) => {
            state.acknowledger.acknowledge(&ack.message_id).await;
        }
        ClientFrameKind::ClientEvent(event) => handle_client_event(state, handle, event).await,
        ClientFrameKind::Unknown(_) => {}
    }

    ControlFlow::Continue(())
}

async fn handle_heartbeat(state: &AppState, handle: &Arc<ConnectionHandle>, hb: HeartbeatFrame) {
    if let Some(channel) = hb.channel {
        state.presence_heartbeat.refresh(&channel, &handle.socket_id).await;
    }
}

async fn handle_batch_subscribe(state: &AppState, handle: &Arc<ConnectionHandle>, batch: BatchSubscribeFrame) {
    let message_id = batch.message_id;
    let outcome = run_batch(
        batch.channels,
        state.config.load_management.max_batch_size,
        |channel: &String| channel.clone(),
        |channel| {
            let handle = handle.clone();
            async move {
                hub::subscribe_channel(state, &handle, &channel, None)
                    .await
                    .map(|_| ())
                    .map_err(|err| err.to_string())
            }
        },
    )
    .await;

    let reply = ServerFrame::new("batch_subscribe_result")
        .with_message_id(message_id)
        .with_data(json!({"succeeded": outcome.succeeded, "failed": outcome.failed}));
    let _ = handle.send(reply).await;
}

async fn handle_batch_unsubscribe(state: &AppState, handle: &Arc<ConnectionHandle>, batch: BatchUnsubscribeFrame) {
    let message_id = batch.message_id;
    let outcome = run_batch(
        batch.channels,
        state.config.load_management.max_batch_size,
        |channel: &String| channel.clone(),
        |channel| {
            let handle = handle.clone();
            async move {
                hub::unsubscribe_channel(state, &handle, &channel).await;
                Ok(())
            }
        },
    )
    .await;

    let reply = ServerFrame::new("batch_unsubscribe_result")
        .with_message_id(message_id)
        .with_data(json!({"succeeded": outcome.succeeded, "failed": outcome.failed}));
    let _ = handle.send(reply).await;
}

async fn handle_batch_broadcast(state: &AppState, handle: &Arc<ConnectionHandle>, batch: BatchBroadcastFrame) {
    let message_id = batch.message_id;
    let outcome = run_batch(
        batch.items,
        state.config.load_management.max_batch_size,
        |item: &BatchBroadcastItem| item.channel.clone(),
        |item| {
            let handle = handle.clone();
            async move { deliver_client_event(state, &handle, &item.channel, &item.event, item.data).await }
        },
    )
    .await;

    let reply = ServerFrame::new("batch_broadcast_result")
        .with_message_id(message_id)
        .with_data(json!({"succeeded": outcome.succeeded, "failed": outcome.failed}));
    let _ = handle.send(reply).await;
}

async fn handle_client_event(state: &AppState, handle: &Arc<ConnectionHandle>, event: ClientEventFrame) {
    let _ = deliver_client_event(state, handle, &event.channel, &event.event, event.data).await;
}

/// Validates, sanitizes, dedups, and fans out one client-originated event.
/// Shared by the single-event and batch gateways alike.
async fn deliver_client_event(
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
    channel: &str,
    event: &str,
    data: Value,
) -> Result<(), String> {
    if !ChannelClass::of(channel).requires_authorization() {
        // Public channels silently drop client-* events: whispers are only
        // meaningful between authorized subscribers of a private/presence
        // channel.
        return Ok(());
    }
    if !state.channels.channel_exists(channel).await {
        return Ok(());
    }
    if let Err(reason) = state.validators.run(channel, event, &data) {
        let _ = handle.send(error_frame(&CoreError::Validation(reason.clone()), None)).await;
        return Err(reason);
    }

    let data = if state.config.security.sanitize_messages {
        sanitize(&data)
    } else {
        data
    };

    if let Some(dedup) = &state.dedup {
        let dedup_key = broadcast_core::dedup::content_key(channel, event, &data);
        if dedup.check_and_insert(&dedup_key).await {
            return Ok(());
        }
    }

    hub::broadcast(state, channel, event, data, Some(&handle.socket_id)).await;
    Ok(())
}

fn error_frame(err: &CoreError, retry_after_ms: Option<u64>) -> ServerFrame {
    let kind = err.kind();
    let mut data: HashMap<&str, Value> = HashMap::new();
    data.insert("type", json!(format!("{kind:?}")));
    data.insert("error", json!(err.to_string()));
    if let Some(retry_after_ms) = retry_after_ms {
        data.insert("retryAfter", json!(retry_after_ms));
    }
    ServerFrame::new("error").with_data(json!(data))
}

fn subscription_error_frame(channel: &str, err: &CoreError) -> ServerFrame {
    let kind = err.kind();
    ServerFrame::new("subscription_error")
        .with_channel(channel.to_owned())
        .with_data(json!({
            "type": format!("{kind:?}"),
            "error": err.to_string(),
            "status": kind.status(),
        }))
}
