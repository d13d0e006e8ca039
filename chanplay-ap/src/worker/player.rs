//! Player loop
//!
//! `WaitingForItem → Playing → Cleanup → WaitingForItem`, until the worker
//! is cancelled. Item failures end the item; sink failures end the worker.
//! The sink is closed exactly once, when the loop exits, even if it panics.

use super::{CurrentItem, Shared};
use crate::error::{Error, Result};
use crate::playback::Playback;
use crate::request::SharedRequest;
use crate::sink::OutputSink;
use chanplay_common::events::ChannelEvent;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(super) async fn run(shared: Arc<Shared>, mut sink: Box<dyn OutputSink>) -> Result<()> {
    let result = AssertUnwindSafe(play_queue(&shared, sink.as_mut()))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            shared.slot().current = None;
            Err(Error::Playback("player loop panicked".to_string()))
        });

    if let Err(e) = sink.close().await {
        warn!("Failed to close output for channel {}: {}", shared.channel_id, e);
    }
    result
}

async fn play_queue(shared: &Arc<Shared>, sink: &mut dyn OutputSink) -> Result<()> {
    let token = shared.token.clone();

    loop {
        shared.gate.wait_open(&token).await?;
        shared.preloaded.wait_available(&token).await?;

        let accepted = {
            let mut slot = shared.slot();
            if !shared.gate.is_open() {
                None
            } else if let Some(item) = shared.preloaded.try_dequeue() {
                let item_token = token.child_token();
                slot.current = Some(CurrentItem {
                    request: item.request.clone(),
                    descriptor: None,
                    cancel: item_token.clone(),
                });
                Some((item, item_token))
            } else {
                None
            }
        };
        let Some((mut item, item_token)) = accepted else {
            continue;
        };

        // The preloaded slot is free as soon as the item leaves the queue.
        shared.permits.add_permits(1);
        shared.pending.fetch_sub(1, Ordering::SeqCst);

        let request = item.request.clone();
        spawn_describe(shared, &request, &item_token);

        info!("Playing '{}' on channel {}", request.label(), shared.channel_id);
        shared.emit(ChannelEvent::started_playing(&shared.channel_id, request.info()));

        let outcome = play_item(
            &mut item.playback,
            sink,
            &item_token,
            &token,
            shared.config.copy_chunk_bytes,
        )
        .await;

        shared.slot().current = None;
        item.playback.dispose();
        shared.emit(ChannelEvent::stopped_playing(&shared.channel_id, request.info()));

        match outcome {
            Ok(()) => debug!("Finished '{}' on channel {}", request.label(), shared.channel_id),
            Err(e) if e.is_cancelled() => {
                if token.is_cancelled() {
                    return Err(e);
                }
                debug!("Skipped '{}' on channel {}", request.label(), shared.channel_id);
            }
            Err(e @ Error::Sink(_)) => return Err(e),
            Err(e) => warn!(
                "Playback of '{}' on channel {} failed: {}",
                request.label(),
                shared.channel_id,
                e
            ),
        }
    }
}

/// Stream one item into the sink
///
/// `item_token` stops the copy between chunks. A chunk already handed to the
/// sink is only interrupted by worker cancellation so frames stay aligned.
async fn play_item(
    playback: &mut Playback,
    sink: &mut dyn OutputSink,
    item_token: &CancellationToken,
    worker_token: &CancellationToken,
    chunk_bytes: usize,
) -> Result<()> {
    let mut stream = playback.open(item_token).await?;
    let mut buf = vec![0u8; chunk_bytes];

    let copied = loop {
        let n = tokio::select! {
            _ = item_token.cancelled() => break Err(Error::Cancelled),
            read = stream.read(&mut buf) => match read {
                Ok(n) => n,
                Err(e) => break Err(Error::Playback(format!("stream read failed: {}", e))),
            },
        };
        if n == 0 {
            break Ok(());
        }

        tokio::select! {
            _ = worker_token.cancelled() => return Err(Error::Cancelled),
            written = sink.write(&buf[..n]) => written.map_err(into_sink_error)?,
        }
    };

    if !worker_token.is_cancelled() {
        sink.flush().await.map_err(into_sink_error)?;
    }
    copied
}

fn into_sink_error(e: Error) -> Error {
    match e {
        Error::Sink(_) => e,
        other => Error::Sink(other.to_string()),
    }
}

/// Resolve the current item's descriptor without delaying playback
fn spawn_describe(shared: &Arc<Shared>, request: &SharedRequest, item_token: &CancellationToken) {
    let shared = shared.clone();
    let request = request.clone();
    let cancel = item_token.clone();
    tokio::spawn(async move {
        if let Ok(descriptor) = request.descriptor(&cancel).await {
            let mut slot = shared.slot();
            if let Some(current) = slot.current.as_mut() {
                if current.request.id() == request.id() {
                    current.descriptor = Some(descriptor);
                }
            }
        }
    });
}
