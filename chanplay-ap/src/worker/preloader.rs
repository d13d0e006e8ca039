//! Preloader loop
//!
//! Keeps up to `preload_window` requests resolved ahead of playback: wait for
//! the run gate, take a preload permit, take the next backlog request, build
//! its playback with eager caching and hand it to the preloaded queue.
//!
//! The request being built sits in the slot until it lands, so snapshots and
//! skips see it. A skip may retire it meanwhile; the result is then disposed.

use super::{PreloadedItem, Resolution, Shared};
use crate::error::{Error, Result};
use crate::playback::Playback;
use crate::request::SharedRequest;
use chanplay_common::events::ChannelEvent;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub(super) async fn run(shared: Arc<Shared>) -> Result<()> {
    let token = shared.token.clone();

    loop {
        shared.gate.wait_open(&token).await?;

        let permit = tokio::select! {
            _ = token.cancelled() => return Err(Error::Cancelled),
            permit = shared.permits.acquire() => permit.map_err(|_| Error::Cancelled)?,
        };
        permit.forget();

        if let Err(e) = shared.backlog.wait_available(&token).await {
            shared.permits.add_permits(1);
            return Err(e);
        }

        let taken = {
            let mut slot = shared.slot();
            if shared.gate.is_open() {
                shared.backlog.try_dequeue().map(|request| {
                    let cancel = token.child_token();
                    slot.resolving = Some(Resolution {
                        request: request.clone(),
                        cancel: cancel.clone(),
                        retired: false,
                    });
                    (request, cancel)
                })
            } else {
                None
            }
        };

        let Some((request, cancel)) = taken else {
            // Gate closed or a skip took the item first
            shared.permits.add_permits(1);
            continue;
        };

        trace!("Resolving '{}' on channel {}", request.label(), shared.channel_id);

        let resolved = request.playback(&cancel).await;
        let landing = land(&shared, &request, resolved);
        shared.resolved.notify_waiters();

        match landing {
            Landing::Queued(Ok(())) => {
                debug!("Preloaded '{}' on channel {}", request.label(), shared.channel_id);
            }
            Landing::Queued(Err(e)) => {
                shared.pending.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
            Landing::Retired(playback) => {
                if let Some(mut playback) = playback {
                    playback.dispose();
                }
                shared.permits.add_permits(1);
                debug!(
                    "Dropped '{}' on channel {}, skipped while resolving",
                    request.label(),
                    shared.channel_id
                );
            }
            Landing::Failed(e) if e.is_cancelled() => {
                shared.pending.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
            Landing::Failed(e) => {
                warn!(
                    "Failed to resolve '{}' on channel {}: {}",
                    request.label(),
                    shared.channel_id,
                    e
                );
                shared.pending.fetch_sub(1, Ordering::SeqCst);
                shared.permits.add_permits(1);
                shared.emit(ChannelEvent::skipped(&shared.channel_id, request.info()));
            }
        }
    }
}

/// Where a finished resolution went
enum Landing {
    Queued(Result<()>),
    /// Skipped while resolving; the skip already settled its accounting
    Retired(Option<Playback>),
    Failed(Error),
}

/// Move a finished resolution out of the slot and into the preloaded queue
fn land(shared: &Shared, request: &SharedRequest, resolved: Result<Playback>) -> Landing {
    let mut slot = shared.slot();
    let retired = slot
        .resolving
        .take()
        .map_or(false, |resolution| resolution.retired);

    if retired {
        return Landing::Retired(resolved.ok());
    }
    match resolved {
        Ok(playback) => Landing::Queued(shared.preloaded.enqueue(PreloadedItem {
            request: request.clone(),
            playback: playback.with_preloading(),
        })),
        Err(e) => Landing::Failed(e),
    }
}
