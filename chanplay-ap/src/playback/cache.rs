//! In-memory cache stage
//!
//! The first open (or [`CachedPlayback::start_fill`] for preloading) spawns a
//! fill task that owns the inner playback, reads it to the end, disposes it
//! and publishes the buffer. Readers wait for the fill under their own
//! cancellation; cancelling a reader never interrupts the fill.

use super::{AudioStream, Playback};
use crate::error::{Error, Result};
use bytes::Bytes;
use std::io::Cursor;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
enum FillState {
    Pending,
    Ready(Bytes),
    Failed(String),
}

/// Cache over an inner playback
pub struct CachedPlayback {
    /// Present until the fill starts
    inner: Option<Box<Playback>>,
    tx: Option<watch::Sender<FillState>>,
    rx: Option<watch::Receiver<FillState>>,
    fill: Option<JoinHandle<()>>,
}

impl CachedPlayback {
    pub(super) fn new(inner: Playback) -> Self {
        let (tx, rx) = watch::channel(FillState::Pending);
        Self {
            inner: Some(Box::new(inner)),
            tx: Some(tx),
            rx: Some(rx),
            fill: None,
        }
    }

    /// Start the fill task if it has not started yet
    pub(super) fn start_fill(&mut self) {
        let (Some(mut inner), Some(tx)) = (self.inner.take(), self.tx.take()) else {
            return;
        };

        self.fill = Some(tokio::spawn(async move {
            let state = match read_to_bytes(&mut inner).await {
                Ok(bytes) => {
                    debug!("Cache filled with {} bytes", bytes.len());
                    FillState::Ready(bytes)
                }
                Err(e) => {
                    warn!("Cache fill failed: {}", e);
                    FillState::Failed(e.to_string())
                }
            };
            inner.dispose();
            drop(inner);
            let _ = tx.send(state);
        }));
    }

    pub(super) fn is_filled(&self) -> bool {
        self.rx
            .as_ref()
            .map(|rx| matches!(*rx.borrow(), FillState::Ready(_)))
            .unwrap_or(false)
    }

    pub(super) async fn open(&mut self, cancel: &CancellationToken) -> Result<AudioStream> {
        self.start_fill();

        let mut rx = self
            .rx
            .clone()
            .ok_or_else(|| Error::Playback("cache released".to_string()))?;

        loop {
            let state = (*rx.borrow_and_update()).clone();
            match state {
                FillState::Ready(bytes) => return Ok(Box::new(Cursor::new(bytes))),
                FillState::Failed(msg) => return Err(Error::SourceUnavailable(msg)),
                FillState::Pending => {}
            }

            let changed = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                changed = rx.changed() => changed,
            };
            if changed.is_err() && matches!(*rx.borrow(), FillState::Pending) {
                return Err(Error::Playback("cache fill ended without a result".to_string()));
            }
        }
    }

    /// Abort an unfinished fill and release the inner playback and buffer
    pub(super) fn dispose(&mut self) {
        if let Some(fill) = self.fill.take() {
            fill.abort();
        }
        if let Some(mut inner) = self.inner.take() {
            inner.dispose();
        }
        self.tx = None;
        self.rx = None;
    }
}

async fn read_to_bytes(inner: &mut Playback) -> Result<Bytes> {
    // The fill owns its scope; reader cancellation does not reach it.
    let mut stream = inner.open(&CancellationToken::new()).await?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}
