//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Sessions
        .route("/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::logout_session),
        )
        .route(
            "/sessions/{id}/connect",
            post(handlers::sessions::connect_session),
        )
        .route(
            "/sessions/{id}/messages",
            post(handlers::sessions::send_message),
        )
        .route(
            "/sessions/{id}/events",
            get(handlers::sessions::session_events),
        )
        // Gateway ingress
        .route(
            "/gateway/{id}/events",
            post(handlers::gateway::receive_event),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus a few registry gauges.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.sessions().len(),
        "pending_reconnects": state.registry.pending_reconnects(),
        "queued_conversations": state.registry.queued_conversations(),
        "gateway_configured": state.config.gateway.is_some(),
        "processor_enabled": state.config.processor.is_some(),
    }))
}
