//! Scripted requests and transcoder

use async_trait::async_trait;
use bytes::Bytes;
use chanplay_ap::error::{Error, Result};
use chanplay_ap::playback::{AudioStream, Playback, TranscodeOptions, Transcoder};
use chanplay_ap::request::{AudioRequest, ItemDescriptor};
use chanplay_common::events::SourceKind;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared log of resolution steps ("start:R1", "done:R1", "fail:R1")
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Counts reader drops, i.e. releases of the underlying source
#[derive(Clone, Default)]
pub struct DropCounter(Arc<AtomicUsize>);

impl DropCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Reader over `data` that bumps this counter when dropped
    pub fn reader(&self, data: Vec<u8>) -> CountedReader {
        CountedReader {
            inner: Cursor::new(data),
            drops: self.0.clone(),
            bytes_read: Arc::new(AtomicUsize::new(0)),
        }
    }
}

pub struct CountedReader {
    inner: Cursor<Vec<u8>>,
    drops: Arc<AtomicUsize>,
    pub bytes_read: Arc<AtomicUsize>,
}

impl AsyncRead for CountedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let result = Pin::new(&mut self.inner).poll_read(cx, buf);
        let n = buf.filled().len() - before;
        self.bytes_read.fetch_add(n, Ordering::SeqCst);
        result
    }
}

impl Drop for CountedReader {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Request with scripted resolution behavior
///
/// Its audio is `len` bytes of `fill`, so the bytes a sink received can be
/// attributed to requests.
#[derive(Debug, Clone)]
pub struct FakeRequest {
    id: Uuid,
    label: String,
    fill: u8,
    len: usize,
    resolve_delay: Duration,
    /// Resolution runs its full delay even when cancelled
    deaf: bool,
    fail: bool,
    descriptor_fails: bool,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl FakeRequest {
    pub fn new(label: &str, fill: u8, len: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.to_string(),
            fill,
            len,
            resolve_delay: Duration::ZERO,
            deaf: false,
            fail: false,
            descriptor_fails: false,
            journal: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = delay;
        self
    }

    pub fn ignoring_cancel(mut self) -> Self {
        self.deaf = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_failing_descriptor(mut self) -> Self {
        self.descriptor_fails = true;
        self
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.0.clone());
        self
    }

    pub fn shared(self) -> Arc<dyn AudioRequest> {
        Arc::new(self)
    }

    fn log(&self, step: &str) {
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(format!("{}:{}", step, self.label));
        }
    }
}

#[async_trait]
impl AudioRequest for FakeRequest {
    fn id(&self) -> Uuid {
        self.id
    }

    fn requester(&self) -> &str {
        "tester"
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Synthetic
    }

    async fn playback(&self, cancel: &CancellationToken) -> Result<Playback> {
        self.log("start");
        if self.deaf {
            tokio::time::sleep(self.resolve_delay).await;
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.resolve_delay) => {}
            }
        }
        if self.fail {
            self.log("fail");
            return Err(Error::SourceUnavailable(format!("{} is unavailable", self.label)));
        }
        self.log("done");
        Ok(Playback::from_stream(Box::new(Cursor::new(vec![self.fill; self.len]))))
    }

    async fn descriptor(&self, _cancel: &CancellationToken) -> Result<ItemDescriptor> {
        if self.descriptor_fails {
            return Err(Error::SourceUnavailable("no metadata".to_string()));
        }
        Ok(ItemDescriptor {
            name: format!("{} (resolved)", self.label),
            requester: "tester".to_string(),
            source: SourceKind::Synthetic,
        })
    }
}

/// Transcoder that "converts" by upper-casing ASCII, counting calls
#[derive(Clone, Default)]
pub struct FakeTranscoder {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl FakeTranscoder {
    pub fn failing() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        mut input: AudioStream,
        _options: &TranscodeOptions,
        _cancel: &CancellationToken,
    ) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut data = Vec::new();
        input.read_to_end(&mut data).await?;
        if self.fail {
            return Err(Error::Transcode("unsupported input".to_string()));
        }
        data.make_ascii_uppercase();
        Ok(Bytes::from(data))
    }
}
