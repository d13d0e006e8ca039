//! Composable playback pipeline
//!
//! A [`Playback`] produces one request's audio as a byte stream. Stages wrap
//! each other with builder functions:
//!
//! ```text
//! Source ──with_cache──▶ Cached ──with_transcoding──▶ Transcoded ──with_preloading──▶ Cached (eager)
//! ```
//!
//! **Ownership:** a playback is owned by exactly one component at a time.
//! Disposing the outermost stage disposes every inner stage once. Dropping a
//! playback disposes it.

mod cache;
mod source;
pub mod transcode;

pub use cache::CachedPlayback;
pub use source::SourcePlayback;
pub use transcode::{FfmpegTranscoder, TranscodeOptions, Transcoder, TranscodedPlayback};

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// Byte stream produced by a playback
pub type AudioStream = Box<dyn AsyncRead + Send + Unpin>;

/// Output sample rate of the PCM wire format
pub const PCM_SAMPLE_RATE: u32 = 48_000;
/// Output channel count of the PCM wire format
pub const PCM_CHANNELS: u16 = 2;
/// Bytes per second of the PCM wire format (s16le)
pub const PCM_BYTES_PER_SECOND: usize = PCM_SAMPLE_RATE as usize * PCM_CHANNELS as usize * 2;

enum Stage {
    Source(SourcePlayback),
    Cached(CachedPlayback),
    Transcoded(TranscodedPlayback),
}

/// One request's audio, possibly wrapped by cache/transcode stages
pub struct Playback {
    stage: Stage,
    disposed: bool,
}

impl Playback {
    /// Leaf playback over a raw byte stream
    pub fn from_stream(stream: AudioStream) -> Self {
        Self::from_stage(Stage::Source(SourcePlayback::new(stream)))
    }

    fn from_stage(stage: Stage) -> Self {
        Self {
            stage,
            disposed: false,
        }
    }

    /// Materialize the stream into memory on first read and serve copies afterwards
    ///
    /// Caching an already cached playback returns it unchanged.
    pub fn with_cache(self) -> Self {
        if self.is_cache() {
            return self;
        }
        Self::from_stage(Stage::Cached(CachedPlayback::new(self)))
    }

    /// Normalize the stream to the PCM wire format through `transcoder`
    pub fn with_transcoding(
        self,
        transcoder: Arc<dyn Transcoder>,
        options: TranscodeOptions,
    ) -> Self {
        Self::from_stage(Stage::Transcoded(TranscodedPlayback::new(
            self, transcoder, options,
        )))
    }

    /// Cache the stream and start filling the cache immediately
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_preloading(self) -> Self {
        let mut cached = self.with_cache();
        if let Stage::Cached(cache) = &mut cached.stage {
            cache.start_fill();
        }
        cached
    }

    /// True when this stage caches its inner stream
    pub fn is_cache(&self) -> bool {
        matches!(self.stage, Stage::Cached(_))
    }

    /// True once a cache stage holds the complete stream
    pub fn is_cached(&self) -> bool {
        match &self.stage {
            Stage::Cached(cache) => cache.is_filled(),
            _ => false,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Produce the audio stream
    ///
    /// `cancel` bounds how long the caller waits. It never interrupts a cache
    /// fill that has already started.
    pub fn open<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<AudioStream>> {
        // Boxed because stages open their inner playback recursively.
        Box::pin(async move {
            if self.disposed {
                return Err(Error::Playback("playback already disposed".to_string()));
            }
            match &mut self.stage {
                Stage::Source(source) => source.open(),
                Stage::Cached(cache) => cache.open(cancel).await,
                Stage::Transcoded(transcoded) => transcoded.open(cancel).await,
            }
        })
    }

    /// Release this stage and every stage it wraps; repeated calls are no-ops
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        match &mut self.stage {
            Stage::Source(source) => source.dispose(),
            Stage::Cached(cache) => cache.dispose(),
            Stage::Transcoded(transcoded) => transcoded.dispose(),
        }
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Playback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match &self.stage {
            Stage::Source(_) => "Source",
            Stage::Cached(_) => "Cached",
            Stage::Transcoded(_) => "Transcoded",
        };
        f.debug_struct("Playback")
            .field("stage", &stage)
            .field("disposed", &self.disposed)
            .finish()
    }
}
