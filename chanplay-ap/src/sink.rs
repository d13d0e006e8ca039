//! Output sinks
//!
//! A worker opens one sink when it starts and closes it exactly once when it
//! stops. Sinks receive raw PCM in the wire format.

use crate::error::{Error, Result};
use crate::playback::PCM_BYTES_PER_SECOND;
use async_trait::async_trait;
use chanplay_common::events::validate_channel_id;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Destination of one channel's audio
#[async_trait]
pub trait OutputSink: Send {
    async fn write(&mut self, buf: &[u8]) -> Result<()>;

    async fn flush(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Cancelled when the transport behind the sink goes away
    fn disconnected(&self) -> Option<CancellationToken> {
        None
    }
}

/// Opens the sink for a channel
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn open(&self, channel_id: &str) -> Result<Box<dyn OutputSink>>;
}

/// Appends PCM to `<dir>/<channel>.pcm`
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
}

impl FileSink {
    /// Open for appending; the channel id must be a valid file stem
    pub async fn open(dir: &Path, channel_id: &str) -> Result<Self> {
        validate_channel_id(channel_id)?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Sink(format!("cannot create {}: {}", dir.display(), e)))?;

        let path = dir.join(format!("{}.pcm", channel_id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::Sink(format!("cannot open {}: {}", path.display(), e)))?;

        info!("Opened file sink {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::Sink(format!("{} already closed", self.path.display())))
    }
}

#[async_trait]
impl OutputSink for FileSink {
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        let file = self.file()?;
        file.write_all(buf)
            .await
            .map_err(|e| Error::Sink(e.to_string()))
    }

    async fn flush(&mut self) -> Result<()> {
        let file = self.file()?;
        file.flush().await.map_err(|e| Error::Sink(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(|e| Error::Sink(e.to_string()))?;
            debug!("Closed file sink {}", self.path.display());
        }
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullSink {
    written: u64,
}

impl NullSink {
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

#[async_trait]
impl OutputSink for NullSink {
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.written += buf.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Paces writes to the PCM byte rate so a file or pipe fills in real time
pub struct RealtimeSink<S> {
    inner: S,
    bytes_per_second: usize,
    clock: Option<(Instant, u64)>,
}

impl<S: OutputSink> RealtimeSink<S> {
    pub fn new(inner: S) -> Self {
        Self::with_rate(inner, PCM_BYTES_PER_SECOND)
    }

    pub fn with_rate(inner: S, bytes_per_second: usize) -> Self {
        Self {
            inner,
            bytes_per_second: bytes_per_second.max(1),
            clock: None,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: OutputSink> OutputSink for RealtimeSink<S> {
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write(buf).await?;

        let (started, sent) = self.clock.get_or_insert_with(|| (Instant::now(), 0));
        *sent += buf.len() as u64;
        let due = *started
            + Duration::from_secs_f64(*sent as f64 / self.bytes_per_second as f64);
        tokio::time::sleep_until(due).await;
        Ok(())
    }

    /// Flushing ends a burst; the pacing clock restarts on the next write
    async fn flush(&mut self) -> Result<()> {
        self.clock = None;
        self.inner.flush().await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }

    fn disconnected(&self) -> Option<CancellationToken> {
        self.inner.disconnected()
    }
}

/// Opens a [`FileSink`] per channel under one directory
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    dir: PathBuf,
    realtime: bool,
}

impl FileSinkFactory {
    pub fn new(dir: impl Into<PathBuf>, realtime: bool) -> Self {
        Self {
            dir: dir.into(),
            realtime,
        }
    }
}

#[async_trait]
impl SinkFactory for FileSinkFactory {
    async fn open(&self, channel_id: &str) -> Result<Box<dyn OutputSink>> {
        let sink = FileSink::open(&self.dir, channel_id).await?;
        if self.realtime {
            Ok(Box::new(RealtimeSink::new(sink)))
        } else {
            Ok(Box::new(sink))
        }
    }
}

/// Opens a [`NullSink`] per channel
#[derive(Debug, Clone, Default)]
pub struct NullSinkFactory;

#[async_trait]
impl SinkFactory for NullSinkFactory {
    async fn open(&self, _channel_id: &str) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(NullSink::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_sink_path_per_channel() {
        let dir = TempDir::new().unwrap();

        let sink = FileSink::open(dir.path(), "lobby_1").await.unwrap();
        assert_eq!(sink.path(), dir.path().join("lobby_1.pcm"));

        let escaped = FileSink::open(dir.path(), "../etc/passwd").await;
        assert!(matches!(escaped, Err(Error::InvalidArgument(_))));
        assert!(FileSink::open(dir.path(), "lobby/1").await.is_err());
    }

    #[tokio::test]
    async fn test_file_sink_appends() {
        let dir = TempDir::new().unwrap();

        let mut sink = FileSink::open(dir.path(), "lobby").await.unwrap();
        sink.write(b"abc").await.unwrap();
        sink.close().await.unwrap();
        assert!(sink.write(b"x").await.is_err());

        let mut sink = FileSink::open(dir.path(), "lobby").await.unwrap();
        sink.write(b"def").await.unwrap();
        sink.close().await.unwrap();

        let data = std::fs::read(dir.path().join("lobby.pcm")).unwrap();
        assert_eq!(data, b"abcdef");
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_sink_paces_writes() {
        let mut sink = RealtimeSink::with_rate(NullSink::default(), 1000);
        let start = Instant::now();

        sink.write(&[0u8; 500]).await.unwrap();
        sink.write(&[0u8; 500]).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(sink.into_inner().bytes_written(), 1000);
    }
}
