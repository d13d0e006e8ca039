//! Channel registry
//!
//! Owns one [`Worker`] per channel. Workers are created lazily on the first
//! start or enqueue and removed on stop. A worker whose loops have already
//! terminated (for example after its output disconnected) is replaced on the
//! next start.
//!
//! The worker map lock is never held across output setup or worker teardown.

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::request::ParserChain;
use crate::sink::{OutputSink, SinkFactory};
use crate::worker::{QueueSnapshot, Worker};
use chanplay_common::events::{validate_channel_id, ChannelEvent, ChannelId, RequestInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ChannelRegistry {
    workers: Mutex<HashMap<ChannelId, Arc<Worker>>>,
    sinks: Arc<dyn SinkFactory>,
    parsers: ParserChain,
    config: WorkerConfig,
    token: CancellationToken,
}

impl ChannelRegistry {
    pub fn new(sinks: Arc<dyn SinkFactory>, parsers: ParserChain, config: WorkerConfig) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            sinks,
            parsers,
            config,
            token: CancellationToken::new(),
        }
    }

    /// Get the running worker for `channel_id`, starting one if needed
    ///
    /// Channel ids must be 1 to 64 characters of `[A-Za-z0-9_-]`. Fails if the
    /// channel's output cannot be opened; no worker is registered then.
    pub async fn start(&self, channel_id: &str) -> Result<Arc<Worker>> {
        validate_channel_id(channel_id)?;
        if self.token.is_cancelled() {
            return Err(Error::QueueClosed);
        }

        let terminated = {
            let mut workers = self.workers.lock().await;
            if let Some(worker) = workers.get(channel_id) {
                if !worker.is_stopped() {
                    return Ok(worker.clone());
                }
            }
            workers.remove(channel_id)
        };
        if let Some(worker) = terminated {
            debug!("Replacing terminated worker for channel {}", channel_id);
            worker.stop().await;
        }

        let sink = self.sinks.open(channel_id).await?;

        let mut workers = self.workers.lock().await;
        let running = workers
            .get(channel_id)
            .filter(|worker| !worker.is_stopped())
            .cloned();
        if let Some(worker) = running {
            drop(workers);
            debug!("Channel {} was started concurrently", channel_id);
            discard_sink(channel_id, sink).await;
            return Ok(worker);
        }
        if self.token.is_cancelled() {
            drop(workers);
            discard_sink(channel_id, sink).await;
            return Err(Error::QueueClosed);
        }

        let worker = Arc::new(Worker::start(
            channel_id,
            self.config.clone(),
            sink,
            &self.token,
        )?);
        let replaced = workers.insert(channel_id.to_string(), worker.clone());
        drop(workers);

        if let Some(stale) = replaced {
            stale.stop().await;
        }
        Ok(worker)
    }

    pub async fn get(&self, channel_id: &str) -> Option<Arc<Worker>> {
        self.workers.lock().await.get(channel_id).cloned()
    }

    pub async fn channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<ChannelId> = self.workers.lock().await.keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Parse `raw` and append it to the channel's queue, starting the channel if needed
    pub async fn enqueue(&self, channel_id: &str, raw: &str, requester: &str) -> Result<RequestInfo> {
        let worker = self.start(channel_id).await?;
        let request = self.parsers.parse(raw, requester)?;
        let info = request.info();
        worker.enqueue(request)?;
        Ok(info)
    }

    /// Skip `count` items on a channel; unknown channels are a no-op
    pub async fn skip(&self, channel_id: &str, count: i64) -> Result<()> {
        if count <= 0 {
            return Err(Error::InvalidArgument(format!(
                "skip count must be positive, got {}",
                count
            )));
        }
        match self.get(channel_id).await {
            Some(worker) => worker.skip(count).await,
            None => Ok(()),
        }
    }

    /// Clear a channel; unknown channels are a no-op
    pub async fn clear(&self, channel_id: &str) -> Result<()> {
        match self.get(channel_id).await {
            Some(worker) => worker.clear().await,
            None => Ok(()),
        }
    }

    /// Queue contents of a channel; empty for unknown channels
    pub async fn queue(&self, channel_id: &str) -> QueueSnapshot {
        match self.get(channel_id).await {
            Some(worker) => worker.snapshot().await,
            None => QueueSnapshot::default(),
        }
    }

    pub async fn subscribe(&self, channel_id: &str) -> Option<broadcast::Receiver<ChannelEvent>> {
        self.get(channel_id).await.map(|worker| worker.subscribe())
    }

    /// Stop and remove a channel's worker; returns false if there was none
    pub async fn stop(&self, channel_id: &str) -> bool {
        let removed = self.workers.lock().await.remove(channel_id);
        match removed {
            Some(worker) => {
                worker.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop every worker and refuse new channels
    pub async fn shutdown(&self) {
        self.token.cancel();
        let workers: Vec<Arc<Worker>> = self.workers.lock().await.drain().map(|(_, w)| w).collect();
        let count = workers.len();
        futures::future::join_all(workers.iter().map(|worker| worker.stop())).await;
        info!("Stopped {} channel workers", count);
    }
}

/// Close an output that lost the race to register its channel
async fn discard_sink(channel_id: &str, mut sink: Box<dyn OutputSink>) {
    if let Err(e) = sink.close().await {
        warn!("Failed to close unused output for channel {}: {}", channel_id, e);
    }
}
