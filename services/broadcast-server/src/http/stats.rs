//! `GET /stats`: a JSON snapshot of [`AppState::stats`] for
//! operators and dashboards, distinct from `/metrics`'s Prometheus text.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::AppState;

pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.stats().await)
}
