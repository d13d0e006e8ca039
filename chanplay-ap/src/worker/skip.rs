//! Skip coordinator
//!
//! The current item always consumes one unit of the skip count. The remaining
//! `n - 1` come from the preloaded queue first, then the request in
//! resolution, then the front of the backlog. All of it is settled under the
//! slot lock with the run gate closed; the skip then waits, at most
//! `skip_drain_timeout`, for a retired resolution to wind down before the
//! gate reopens.

use super::{Shared, Slot};
use chanplay_common::events::ChannelEvent;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How a skip splits across the two queues
///
/// `preloaded` counts the request in resolution as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SkipPlan {
    pub preloaded: usize,
    pub backlog: usize,
}

impl SkipPlan {
    pub(crate) fn new(remaining: usize, preloaded_count: usize) -> Self {
        let preloaded = remaining.min(preloaded_count);
        Self {
            preloaded,
            backlog: remaining - preloaded,
        }
    }
}

/// Cancel the current item and drop `remaining` queued items
pub(super) async fn skip(shared: &Arc<Shared>, remaining: usize) {
    let _serial = shared.skip_lock.lock().await;
    if shared.token.is_cancelled() {
        debug!("Ignoring skip on stopped channel {}", shared.channel_id);
        return;
    }

    let (_gate, skipped) = {
        let mut slot = shared.slot();
        let gate = shared.gate.close();
        if let Some(current) = &slot.current {
            current.cancel.cancel();
        }

        let preloaded_count =
            shared.preloaded.len() + usize::from(slot.in_flight().is_some());
        let plan = SkipPlan::new(remaining, preloaded_count);
        debug!(
            "Skip on channel {}: {} preloaded, {} backlog",
            shared.channel_id, plan.preloaded, plan.backlog
        );

        let mut skipped = drain_preloaded(shared, plan.preloaded);
        if skipped < plan.preloaded && retire_resolution(shared, &mut slot) {
            skipped += 1;
        }
        skipped += drain_backlog(shared, plan.backlog);
        (gate, skipped)
    };

    let drain_scope = shared.token.child_token();
    if tokio::time::timeout(
        shared.config.skip_drain_timeout,
        wait_retired(shared, &drain_scope),
    )
    .await
    .is_err()
    {
        debug!("Retired resolution on channel {} still winding down", shared.channel_id);
    }
    drain_scope.cancel();

    if skipped > 0 {
        info!("Skipped {} queued items on channel {}", skipped, shared.channel_id);
    }
}

fn drain_preloaded(shared: &Shared, count: usize) -> usize {
    let mut drained = 0;
    while drained < count {
        let Some(mut item) = shared.preloaded.try_dequeue() else {
            break;
        };
        item.playback.dispose();
        shared.permits.add_permits(1);
        shared.pending.fetch_sub(1, Ordering::SeqCst);
        shared.emit(ChannelEvent::skipped(&shared.channel_id, item.request.info()));
        drained += 1;
    }
    drained
}

/// Cancel the request in resolution; its permit returns when it lands
fn retire_resolution(shared: &Shared, slot: &mut Slot) -> bool {
    let Some(resolution) = slot.resolving.as_mut().filter(|r| !r.retired) else {
        return false;
    };
    resolution.retired = true;
    resolution.cancel.cancel();
    shared.pending.fetch_sub(1, Ordering::SeqCst);
    shared.emit(ChannelEvent::skipped(&shared.channel_id, resolution.request.info()));
    true
}

fn drain_backlog(shared: &Shared, count: usize) -> usize {
    let mut drained = 0;
    while drained < count {
        let Some(request) = shared.backlog.try_dequeue() else {
            break;
        };
        shared.pending.fetch_sub(1, Ordering::SeqCst);
        shared.emit(ChannelEvent::skipped(&shared.channel_id, request.info()));
        drained += 1;
    }
    drained
}

/// Wait until no retired resolution is left in the slot
async fn wait_retired(shared: &Shared, cancel: &CancellationToken) {
    loop {
        let landed = shared.resolved.notified();
        tokio::pin!(landed);
        landed.as_mut().enable();

        let retiring = shared
            .slot()
            .resolving
            .as_ref()
            .map_or(false, |resolution| resolution.retired);
        if !retiring {
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = &mut landed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prefers_preloaded() {
        assert_eq!(SkipPlan::new(1, 2), SkipPlan { preloaded: 1, backlog: 0 });
        assert_eq!(SkipPlan::new(3, 2), SkipPlan { preloaded: 2, backlog: 1 });
        assert_eq!(SkipPlan::new(0, 2), SkipPlan { preloaded: 0, backlog: 0 });
    }

    #[test]
    fn test_plan_for_clear() {
        let plan = SkipPlan::new(usize::MAX, 2);
        assert_eq!(plan.preloaded, 2);
        assert_eq!(plan.backlog, usize::MAX - 2);
    }
}
