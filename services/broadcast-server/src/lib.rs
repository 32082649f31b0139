pub mod http;
pub mod hub;
pub mod state;
pub mod ws;

pub use state::AppState;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Wires the upgrade route and the operator-facing HTTP surface onto
/// `state`. Does not spawn any background task itself; callers (normally
/// `main`) own the process lifecycle and decide when [`hub::run_relay_listener`]
/// and [`hub::run_sweepers`] start.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Origin allow-listing (a `cors.origins` list) needs per-entry
    // `HeaderValue` parsing this crate doesn't otherwise need; until that
    // lands, `cors.enabled` toggles between permissive and no CORS layer.
    let cors = if state.config.security.cors.enabled {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/app", get(ws::ws_handler))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(http::health::health))
        .route("/stats", get(http::stats::stats))
        .route("/metrics", get(http::metrics::metrics))
        .fallback(http::response::not_found_fallback)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
