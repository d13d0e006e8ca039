//! Recording output sink

use async_trait::async_trait;
use chanplay_ap::error::{Error, Result};
use chanplay_ap::sink::{OutputSink, SinkFactory};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a [`RecordingSink`] saw
#[derive(Default)]
pub struct SinkLog {
    data: Mutex<Vec<u8>>,
    pub writes: AtomicUsize,
    pub flushes: AtomicUsize,
    pub closes: AtomicUsize,
}

impl SinkLog {
    pub fn data(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    /// Number of bytes equal to `fill`
    pub fn bytes_of(&self, fill: u8) -> usize {
        self.data.lock().unwrap().iter().filter(|b| **b == fill).count()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Sink sleeping `delay` per write so playback spans real time
pub struct RecordingSink {
    log: Arc<SinkLog>,
    delay: Duration,
    fail_after_writes: Option<usize>,
    panic_after_writes: Option<usize>,
    disconnect: Option<CancellationToken>,
}

impl RecordingSink {
    pub fn new(delay: Duration) -> (Self, Arc<SinkLog>) {
        let log = Arc::new(SinkLog::default());
        (
            Self {
                log: log.clone(),
                delay,
                fail_after_writes: None,
                panic_after_writes: None,
                disconnect: None,
            },
            log,
        )
    }

    pub fn failing_after(mut self, writes: usize) -> Self {
        self.fail_after_writes = Some(writes);
        self
    }

    pub fn panicking_after(mut self, writes: usize) -> Self {
        self.panic_after_writes = Some(writes);
        self
    }

    pub fn with_disconnect(mut self, token: CancellationToken) -> Self {
        self.disconnect = Some(token);
        self
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        let writes = self.log.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after_writes {
            if writes >= limit {
                return Err(Error::Sink("transport gone".to_string()));
            }
        }
        if let Some(limit) = self.panic_after_writes {
            if writes >= limit {
                panic!("sink driver crashed");
            }
        }
        self.log.data.lock().unwrap().extend_from_slice(buf);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.log.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disconnected(&self) -> Option<CancellationToken> {
        self.disconnect.clone()
    }
}

/// Factory handing out recording sinks and remembering their logs per channel
#[derive(Default)]
pub struct RecordingSinkFactory {
    pub delay: Duration,
    pub fail_open: bool,
    /// Channel whose open takes this long
    pub slow_open: Option<(String, Duration)>,
    pub logs: Mutex<Vec<(String, Arc<SinkLog>)>>,
}

impl RecordingSinkFactory {
    pub fn log_for(&self, channel_id: &str) -> Option<Arc<SinkLog>> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(channel, _)| channel == channel_id)
            .map(|(_, log)| log.clone())
    }
}

#[async_trait]
impl SinkFactory for RecordingSinkFactory {
    async fn open(&self, channel_id: &str) -> Result<Box<dyn OutputSink>> {
        if self.fail_open {
            return Err(Error::Sink(format!("no route to channel {}", channel_id)));
        }
        if let Some((slow_channel, delay)) = &self.slow_open {
            if slow_channel == channel_id {
                tokio::time::sleep(*delay).await;
            }
        }
        let (sink, log) = RecordingSink::new(self.delay);
        self.logs.lock().unwrap().push((channel_id.to_string(), log));
        Ok(Box::new(sink))
    }
}
