//! Server-Sent Events (SSE) utilities
//!
//! Turns a channel's event receiver into an SSE response.

use crate::events::ChannelEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};

/// Keep-alive interval for all chanplay SSE streams
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert one channel event into an SSE frame
///
/// Frames are named after the event type and carry the JSON payload.
pub fn event_frame(event: &ChannelEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("SSE: failed to serialize {} event: {}", event.event_type(), e);
            None
        }
    }
}

/// Stream of SSE frames for one channel
///
/// Starts with a `ConnectionStatus` frame. Lagged receivers skip the lost
/// events and continue.
pub fn channel_event_stream(
    channel_id: String,
    rx: broadcast::Receiver<ChannelEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    info!("New SSE client connected to channel {}", channel_id);

    let connected = futures::stream::once(async {
        Ok(Event::default().event("ConnectionStatus").data("connected"))
    });

    let events = BroadcastStream::new(rx).filter_map(move |item| {
        let channel_id = channel_id.clone();
        async move {
            match item {
                Ok(event) => event_frame(&event).map(Ok),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    debug!("SSE: client on channel {} lagged by {} events", channel_id, n);
                    None
                }
            }
        }
    });

    connected.chain(events)
}

/// Wrap a channel event stream in an SSE response with heartbeat keep-alive
pub fn channel_event_sse(
    channel_id: String,
    rx: broadcast::Receiver<ChannelEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(channel_event_stream(channel_id, rx)).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}

/// Heartbeat-only SSE stream, used for channels that do not exist yet
pub fn create_heartbeat_sse_stream(
    channel_id: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to idle channel {}", channel_id);

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("idle"));

        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            debug!("SSE: Sending heartbeat");
            yield Ok(Event::default().comment("heartbeat"));
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
