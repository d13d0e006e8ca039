//! Server-Sent Events for channel workers

use crate::api::server::AppContext;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use tracing::debug;

/// GET /channels/:channel_id/events - SSE event stream
///
/// Channels without a worker get a heartbeat-only stream; reconnect after
/// starting the channel to receive its events.
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<String>,
) -> Response {
    match ctx.registry.subscribe(&channel_id).await {
        Some(rx) => {
            debug!("SSE subscriber attached to channel {}", channel_id);
            chanplay_common::sse::channel_event_sse(channel_id, rx).into_response()
        }
        None => chanplay_common::sse::create_heartbeat_sse_stream(channel_id).into_response(),
    }
}
