//! Run gate pausing the preloader and player while a skip drains the queues

use crate::error::{Error, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct RunGate {
    tx: watch::Sender<bool>,
}

impl RunGate {
    /// Gates start open
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self { tx }
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Close the gate until the returned guard is dropped
    pub fn close(&self) -> GateGuard<'_> {
        self.tx.send_replace(false);
        GateGuard { gate: self }
    }

    pub async fn wait_open(&self, cancel: &CancellationToken) -> Result<()> {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                changed = rx.changed() => changed.map_err(|_| Error::Cancelled)?,
            }
        }
    }
}

impl Default for RunGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Reopens the gate on drop, including when the closing operation unwinds
pub struct GateGuard<'a> {
    gate: &'a RunGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.tx.send_replace(true);
    }
}
