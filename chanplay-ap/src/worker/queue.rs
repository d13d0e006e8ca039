//! Closable FIFO queue with async waiting
//!
//! Producers never block. Consumers wait for an item under a cancellation
//! token. Closing wakes every waiter; items already queued stay available to
//! `try_dequeue` so the owner can dispose them.

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct AsyncQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item; fails once the queue is closed
    pub fn enqueue(&self, item: T) -> Result<()> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(Error::QueueClosed);
            }
            state.items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    pub fn try_dequeue(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Wait for the next item
    ///
    /// Fails with `Cancelled` when `cancel` fires or the queue is closed and empty.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Result<T> {
        loop {
            if let Some(item) = self.try_dequeue() {
                return Ok(item);
            }
            self.wait_available(cancel).await?;
        }
    }

    /// Wait until the queue is non-empty without taking anything
    pub async fn wait_available(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock();
                if !state.items.is_empty() {
                    return Ok(());
                }
                if state.closed {
                    return Err(Error::Cancelled);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    /// Reject further enqueues and wake all waiters
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Copy out the queued items in order without removing them
    pub fn snapshot<R>(&self, f: impl Fn(&T) -> R) -> Vec<R> {
        self.lock().items.iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = AsyncQueue::new();
        let cancel = CancellationToken::new();
        for i in 0..3 {
            queue.enqueue(i).unwrap();
        }
        assert_eq!(queue.snapshot(|i| *i), vec![0, 1, 2]);
        assert_eq!(queue.dequeue(&cancel).await.unwrap(), 0);
        assert_eq!(queue.dequeue(&cancel).await.unwrap(), 1);
        assert_eq!(queue.dequeue(&cancel).await.unwrap(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let queue = Arc::new(AsyncQueue::new());
        let cancel = CancellationToken::new();

        let consumer = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue("late").unwrap();

        let item = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(item, "late");
    }

    #[tokio::test]
    async fn test_close_unblocks_waiters_and_rejects_enqueue() {
        let queue = Arc::new(AsyncQueue::<u32>::new());
        let cancel = CancellationToken::new();

        let consumer = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(matches!(queue.enqueue(1), Err(Error::QueueClosed)));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_dequeue() {
        let queue = AsyncQueue::<u32>::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(queue.dequeue(&cancel).await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_closed_queue_keeps_items_for_disposal() {
        let queue = AsyncQueue::new();
        queue.enqueue(7).unwrap();
        queue.close();
        assert_eq!(queue.try_dequeue(), Some(7));
    }
}
