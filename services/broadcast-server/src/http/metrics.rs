//! `GET /metrics`: the same counters as `/stats`, rendered as
//! Prometheus text exposition instead of JSON. The core tracks the values;
//! this is the one place that formats them for a particular scraper.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::http::header;

use crate::state::AppState;

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connections = state.connections.len().await;
    let channels = state.channels.channel_count().await;
    let pending_acks = state.acknowledger.pending_count().await;
    let dedup_entries = match &state.dedup {
        Some(dedup) => dedup.len().await,
        None => 0,
    };
    let rate_limited_keys = state.rate_limiter.tracked_keys().await;

    let body = format!(
        "# HELP broadcast_connections Currently open WebSocket connections.\n\
         # TYPE broadcast_connections gauge\n\
         broadcast_connections {connections}\n\
         # HELP broadcast_channels Channels with at least one subscriber.\n\
         # TYPE broadcast_channels gauge\n\
         broadcast_channels {channels}\n\
         # HELP broadcast_pending_acks Messages awaiting client acknowledgment.\n\
         # TYPE broadcast_pending_acks gauge\n\
         broadcast_pending_acks {pending_acks}\n\
         # HELP broadcast_dedup_entries Live entries in the deduplication cache.\n\
         # TYPE broadcast_dedup_entries gauge\n\
         broadcast_dedup_entries {dedup_entries}\n\
         # HELP broadcast_rate_limited_keys Keys currently tracked by the rate limiter.\n\
         # TYPE broadcast_rate_limited_keys gauge\n\
         broadcast_rate_limited_keys {rate_limited_keys}\n"
    );

    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
