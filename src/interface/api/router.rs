//! API Router configuration

use super::calls_handler::{health_check, originate_call};
use super::metrics_handler::metrics_handler;
use crate::application::outbound::OutboundDispatcher;
use crate::application::session::AgentRuntime;
use crate::config::SessionConfig;
use crate::interface::websocket::agent_ws_handler;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state of the HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub dispatcher: Arc<OutboundDispatcher>,
    pub session: SessionConfig,
}

/// Build the API router
pub fn build_router(state: AppState, prometheus_handle: PrometheusHandle) -> Router {
    // Health check route
    let health_routes = Router::new().route("/health", get(health_check));

    // Call routes
    let call_routes = Router::new().route("/calls/outbound", post(originate_call));

    // Session runtime connections
    let agent_routes = Router::new().route("/agent/ws", get(agent_ws_handler));

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    Router::new()
        .merge(health_routes)
        .merge(call_routes)
        .merge(agent_routes)
        .with_state(state)
        .merge(metrics_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
