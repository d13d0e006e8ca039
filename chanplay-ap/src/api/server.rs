//! HTTP server setup and routing

use crate::registry::ChannelRegistry;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<ChannelRegistry>,
    pub port: u16,
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/channels", get(super::handlers::list_channels))
        .route("/channels/:channel_id", delete(super::handlers::stop_channel))
        .route("/channels/:channel_id/start", post(super::handlers::start_channel))
        .route(
            "/channels/:channel_id/queue",
            get(super::handlers::get_queue).post(super::handlers::enqueue),
        )
        .route("/channels/:channel_id/skip", post(super::handlers::skip))
        .route("/channels/:channel_id/clear", post(super::handlers::clear))
        .route("/channels/:channel_id/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}
