//! Per-channel worker
//!
//! One worker serializes a channel's requests into continuous playback on a
//! single output sink.
//!
//! ```text
//! enqueue ──▶ backlog ──▶ preloader ──▶ preloaded ──▶ player ──▶ sink
//!                 ▲                         ▲            ▲
//!                 └──────── skip / clear ───┴────────────┘
//! ```
//!
//! **Accounting:**
//! - `pending` counts requests in the backlog, in resolution, or preloaded.
//! - A preload permit is held by every request in resolution or preloaded, so
//!   at most `preload_window` requests are resolved ahead of the current one.
//! - Every transfer between backlog, resolution, preloaded queue and player
//!   happens under the slot lock, and transfers out of a queue only while the
//!   run gate is open. A skip closes the gate and settles all of its
//!   accounting under that one lock, so its view cannot shift underneath it.
//! - A skip that reaches the request in resolution retires it: the resolution
//!   is cancelled and whatever it produces is disposed, never queued.
//!
//! **Cancellation scopes:** worker token → per-item token (skip), worker
//! token → per-resolution token (skip) and worker token → skip-drain token
//! (bounded by `skip_drain_timeout`).

mod gate;
mod player;
mod preloader;
pub mod queue;
mod skip;

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::playback::Playback;
use crate::request::{ItemDescriptor, SharedRequest};
use crate::sink::OutputSink;
use chanplay_common::events::{ChannelEvent, ChannelId, EventBus};
use futures::future::join_all;
use futures::FutureExt;
use gate::RunGate;
use queue::AsyncQueue;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A resolved request waiting to play
pub(crate) struct PreloadedItem {
    request: SharedRequest,
    playback: Playback,
}

/// The item the player is streaming
struct CurrentItem {
    request: SharedRequest,
    descriptor: Option<ItemDescriptor>,
    cancel: CancellationToken,
}

/// The request taken from the backlog whose playback is being built
struct Resolution {
    request: SharedRequest,
    cancel: CancellationToken,
    /// Skipped while resolving; already removed from `pending`
    retired: bool,
}

#[derive(Default)]
struct Slot {
    current: Option<CurrentItem>,
    resolving: Option<Resolution>,
}

impl Slot {
    /// The resolving request, unless a skip already retired it
    fn in_flight(&self) -> Option<&Resolution> {
        self.resolving.as_ref().filter(|resolution| !resolution.retired)
    }
}

/// Ordered queue contents, current item first
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSnapshot {
    pub current: Option<ItemDescriptor>,
    pub items: Vec<ItemDescriptor>,
}

impl QueueSnapshot {
    /// Flatten into one list with the current item (if any) first
    pub fn into_descriptors(self) -> Vec<ItemDescriptor> {
        self.current.into_iter().chain(self.items).collect()
    }
}

struct Shared {
    channel_id: ChannelId,
    config: WorkerConfig,
    backlog: AsyncQueue<SharedRequest>,
    preloaded: AsyncQueue<PreloadedItem>,
    permits: Semaphore,
    pending: AtomicUsize,
    /// Signalled whenever a resolution leaves the slot, successfully or not
    resolved: Notify,
    gate: RunGate,
    slot: Mutex<Slot>,
    skip_lock: tokio::sync::Mutex<()>,
    events: EventBus,
    token: CancellationToken,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ChannelEvent) {
        self.events.emit_lossy(event);
    }

    /// Close both queues and cancel every loop
    fn shut_down(&self) {
        self.token.cancel();
        self.backlog.close();
        self.preloaded.close();
    }
}

/// Per-channel playback worker
pub struct Worker {
    shared: Arc<Shared>,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Worker {
    /// Start the preloader and player loops for `channel_id`
    ///
    /// The worker's scope is a child of `parent`; cancelling `parent` stops it.
    pub fn start(
        channel_id: impl Into<ChannelId>,
        config: WorkerConfig,
        sink: Box<dyn OutputSink>,
        parent: &CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let channel_id = channel_id.into();

        let shared = Arc::new(Shared {
            permits: Semaphore::new(config.preload_window),
            events: EventBus::new(config.event_capacity),
            channel_id: channel_id.clone(),
            config,
            backlog: AsyncQueue::new(),
            preloaded: AsyncQueue::new(),
            pending: AtomicUsize::new(0),
            resolved: Notify::new(),
            gate: RunGate::new(),
            slot: Mutex::new(Slot::default()),
            skip_lock: tokio::sync::Mutex::new(()),
            token: parent.child_token(),
        });

        let mut handles = Vec::with_capacity(3);

        if let Some(disconnected) = sink.disconnected() {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = disconnected.cancelled() => {
                        info!("Output for channel {} disconnected", shared.channel_id);
                        shared.shut_down();
                    }
                    _ = shared.token.cancelled() => {}
                }
            }));
        }

        handles.push(spawn_loop(
            shared.clone(),
            "preloader",
            preloader::run(shared.clone()),
        ));
        handles.push(spawn_loop(
            shared.clone(),
            "player",
            player::run(shared.clone(), sink),
        ));

        info!(
            "Started worker for channel {} (preload window {})",
            channel_id, shared.config.preload_window
        );

        Ok(Self {
            shared,
            handles: tokio::sync::Mutex::new(handles),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn channel_id(&self) -> &str {
        &self.shared.channel_id
    }

    /// Append a request to the backlog
    pub fn enqueue(&self, request: SharedRequest) -> Result<()> {
        if self.shared.token.is_cancelled() {
            return Err(Error::QueueClosed);
        }

        let info = request.info();
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.shared.backlog.enqueue(request) {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }

        debug!("Enqueued '{}' on channel {}", info.label, self.shared.channel_id);
        self.shared
            .emit(ChannelEvent::enqueued(&self.shared.channel_id, info));
        Ok(())
    }

    /// Skip `count` items, the current one included
    pub async fn skip(&self, count: i64) -> Result<()> {
        if count <= 0 {
            return Err(Error::InvalidArgument(format!(
                "skip count must be positive, got {}",
                count
            )));
        }
        skip::skip(&self.shared, (count - 1) as usize).await;
        Ok(())
    }

    /// Skip the current item and everything queued
    pub async fn clear(&self) -> Result<()> {
        skip::skip(&self.shared, usize::MAX).await;
        Ok(())
    }

    /// Descriptor of the item being streamed
    pub fn currently_playing(&self) -> Option<ItemDescriptor> {
        self.shared.slot().current.as_ref().map(|current| {
            current
                .descriptor
                .clone()
                .unwrap_or_else(|| current.request.fallback_descriptor())
        })
    }

    /// Requests waiting in the backlog, in resolution, or preloaded
    pub fn pending_count(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Requests resolved or being resolved ahead of the current one
    pub fn preloaded_count(&self) -> usize {
        let slot = self.shared.slot();
        self.shared.preloaded.len() + usize::from(slot.in_flight().is_some())
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    /// Non-destructive view of the queue, current item first
    ///
    /// Order is preloaded items, the request in resolution, then the backlog.
    /// Descriptors are resolved concurrently; one that fails falls back to
    /// the request's label.
    pub async fn snapshot(&self) -> QueueSnapshot {
        let (current, descriptor, requests) = {
            let slot = self.shared.slot();
            let (current, descriptor) = match &slot.current {
                Some(current) => (Some(current.request.clone()), current.descriptor.clone()),
                None => (None, None),
            };
            let mut requests = self
                .shared
                .preloaded
                .snapshot(|item| item.request.clone());
            requests.extend(slot.in_flight().map(|resolution| resolution.request.clone()));
            requests.extend(self.shared.backlog.snapshot(|request| request.clone()));
            (current, descriptor, requests)
        };

        let cancel = self.shared.token.child_token();
        let items = join_all(requests.iter().map(|request| describe(request, &cancel))).await;

        let current = match (current, descriptor) {
            (Some(_), Some(descriptor)) => Some(descriptor),
            (Some(request), None) => Some(describe(&request, &cancel).await),
            (None, _) => None,
        };

        QueueSnapshot { current, items }
    }

    /// Stop both loops, close the queues and release the sink
    ///
    /// Idempotent. Playbacks left in the preloaded queue are disposed.
    pub async fn stop(&self) {
        let first = !self.stopped.swap(true, Ordering::SeqCst);
        self.shared.shut_down();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Worker task for channel {} ended abnormally: {}", self.shared.channel_id, e);
            }
        }

        let mut released = 0;
        if let Some(resolution) = self.shared.slot().resolving.take() {
            resolution.cancel.cancel();
            if !resolution.retired {
                released += 1;
            }
        }
        while let Some(mut item) = self.shared.preloaded.try_dequeue() {
            item.playback.dispose();
            released += 1;
        }
        while self.shared.backlog.try_dequeue().is_some() {
            released += 1;
        }
        if released > 0 {
            self.shared.pending.fetch_sub(released, Ordering::SeqCst);
        }

        if first {
            info!("Stopped worker for channel {}", self.shared.channel_id);
        }
    }
}

async fn describe(request: &SharedRequest, cancel: &CancellationToken) -> ItemDescriptor {
    match request.descriptor(cancel).await {
        Ok(descriptor) => descriptor,
        Err(e) => {
            debug!("Descriptor for '{}' unavailable: {}", request.label(), e);
            request.fallback_descriptor()
        }
    }
}

/// Run one worker loop; any failure other than cancellation tears the worker down
fn spawn_loop<F>(shared: Arc<Shared>, name: &'static str, body: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match AssertUnwindSafe(body).catch_unwind().await {
            Ok(Ok(())) => debug!("{} loop for channel {} finished", name, shared.channel_id),
            Ok(Err(e)) if e.is_cancelled() => {
                debug!("{} loop for channel {} cancelled", name, shared.channel_id)
            }
            Ok(Err(e)) => error!("{} loop for channel {} failed: {}", name, shared.channel_id, e),
            Err(_) => error!("{} loop for channel {} panicked", name, shared.channel_id),
        }
        shared.shut_down();
    })
}
