//! Test helper modules for chanplay-ap integration tests
//!
//! - FakeRequest: scripted request with configurable delay/failure, journaling resolutions
//! - RecordingSink: paced sink recording bytes, flushes and closes
//! - FakeTranscoder: in-process transcoder counting invocations
//! - Event and polling helpers

#![allow(dead_code)]

pub mod requests;
pub mod sinks;

pub use requests::{DropCounter, FakeRequest, FakeTranscoder, Journal};
pub use sinks::{RecordingSink, RecordingSinkFactory, SinkLog};

use chanplay_ap::config::WorkerConfig;
use chanplay_common::events::ChannelEvent;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default timeout for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// Worker config with small copy chunks so playback takes observable time
pub fn test_config(preload_window: usize) -> WorkerConfig {
    WorkerConfig {
        preload_window,
        skip_drain_timeout: Duration::from_millis(500),
        event_capacity: 256,
        copy_chunk_bytes: 64,
    }
}

/// Receive events until one matches `pred`, returning every event seen
pub async fn collect_until(
    rx: &mut broadcast::Receiver<ChannelEvent>,
    pred: impl Fn(&ChannelEvent) -> bool,
) -> Vec<ChannelEvent> {
    tokio::time::timeout(WAIT, async {
        let mut seen = Vec::new();
        loop {
            let event = rx.recv().await.expect("event bus closed");
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `cond` until it holds
pub async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for condition")
}

pub fn is_started(event: &ChannelEvent, label: &str) -> bool {
    matches!(event, ChannelEvent::StartedPlaying { request, .. } if request.label == label)
}

pub fn is_stopped(event: &ChannelEvent, label: &str) -> bool {
    matches!(event, ChannelEvent::StoppedPlaying { request, .. } if request.label == label)
}

pub fn is_skipped(event: &ChannelEvent, label: &str) -> bool {
    matches!(event, ChannelEvent::Skipped { request, .. } if request.label == label)
}

/// Labels of StartedPlaying events in order
pub fn started_labels(events: &[ChannelEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ChannelEvent::StartedPlaying { request, .. } => Some(request.label.clone()),
            _ => None,
        })
        .collect()
}

/// Labels of Skipped events in order
pub fn skipped_labels(events: &[ChannelEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ChannelEvent::Skipped { request, .. } => Some(request.label.clone()),
            _ => None,
        })
        .collect()
}
