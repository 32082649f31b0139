//! `GET /health`: reports process liveness plus relay adapter
//! reachability, the one external dependency whose failure should surface
//! here without taking the endpoint itself down.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::http::response::service_unavailable;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.relay.health_check().await {
        Ok(()) => Json(json!({
            "status": "ok",
            "relay": true,
        }))
        .into_response(),
        Err(err) => service_unavailable(format!("relay unreachable: {err}")).into_response(),
    }
}
