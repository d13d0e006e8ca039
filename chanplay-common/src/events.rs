//! Event types for chanplay channel workers
//!
//! Every channel worker owns one [`EventBus`]. Events are best-effort: emitting
//! never blocks and never fails when nobody is listening.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Key addressing one destination channel
pub type ChannelId = String;

/// Longest accepted channel id
pub const MAX_CHANNEL_ID_LEN: usize = 64;

/// Check that `channel_id` is 1 to 64 characters of `[A-Za-z0-9_-]`
///
/// Valid ids map one-to-one onto output names such as file stems.
pub fn validate_channel_id(channel_id: &str) -> Result<()> {
    if channel_id.is_empty() || channel_id.len() > MAX_CHANNEL_ID_LEN {
        return Err(Error::InvalidInput(format!(
            "channel id must be 1 to {} characters",
            MAX_CHANNEL_ID_LEN
        )));
    }
    if let Some(c) = channel_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(Error::InvalidInput(format!(
            "channel id '{}' contains '{}'; use letters, digits, '-' or '_'",
            channel_id, c
        )));
    }
    Ok(())
}

/// Kind of source a request resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// http/https download
    Remote,
    /// File tracked in the file store
    Stored,
    /// Local file path
    File,
    /// Generated PCM (debug fixture)
    Synthetic,
}

impl SourceKind {
    /// Short label shown in queue listings
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Remote => "remote",
            SourceKind::Stored => "stored",
            SourceKind::File => "file",
            SourceKind::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the request an event is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub id: Uuid,
    pub requester: String,
    pub label: String,
    pub source: SourceKind,
}

/// Channel worker events
///
/// Serialized with a `type` tag so they can be forwarded as SSE payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelEvent {
    /// Request accepted into the backlog
    Enqueued {
        channel_id: ChannelId,
        request: RequestInfo,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Request dropped by skip/clear, or dropped because it could not be resolved
    Skipped {
        channel_id: ChannelId,
        request: RequestInfo,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Request began streaming to the output sink
    StartedPlaying {
        channel_id: ChannelId,
        request: RequestInfo,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Request finished, was cancelled, or failed mid-stream
    StoppedPlaying {
        channel_id: ChannelId,
        request: RequestInfo,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ChannelEvent {
    pub fn enqueued(channel_id: &str, request: RequestInfo) -> Self {
        ChannelEvent::Enqueued {
            channel_id: channel_id.to_string(),
            request,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn skipped(channel_id: &str, request: RequestInfo) -> Self {
        ChannelEvent::Skipped {
            channel_id: channel_id.to_string(),
            request,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn started_playing(channel_id: &str, request: RequestInfo) -> Self {
        ChannelEvent::StartedPlaying {
            channel_id: channel_id.to_string(),
            request,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn stopped_playing(channel_id: &str, request: RequestInfo) -> Self {
        ChannelEvent::StoppedPlaying {
            channel_id: channel_id.to_string(),
            request,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Get event type as string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ChannelEvent::Enqueued { .. } => "Enqueued",
            ChannelEvent::Skipped { .. } => "Skipped",
            ChannelEvent::StartedPlaying { .. } => "StartedPlaying",
            ChannelEvent::StoppedPlaying { .. } => "StoppedPlaying",
        }
    }

    /// Request the event is about
    pub fn request(&self) -> &RequestInfo {
        match self {
            ChannelEvent::Enqueued { request, .. }
            | ChannelEvent::Skipped { request, .. }
            | ChannelEvent::StartedPlaying { request, .. }
            | ChannelEvent::StoppedPlaying { request, .. } => request,
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            ChannelEvent::Enqueued { channel_id, .. }
            | ChannelEvent::Skipped { channel_id, .. }
            | ChannelEvent::StartedPlaying { channel_id, .. }
            | ChannelEvent::StoppedPlaying { channel_id, .. } => channel_id,
        }
    }
}

/// Broadcast bus for [`ChannelEvent`]s
///
/// Slow subscribers lag and lose the oldest events; emitters never wait.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ChannelEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use chanplay_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ChannelEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<ChannelEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ChannelEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
