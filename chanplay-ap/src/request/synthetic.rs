//! Generated PCM requests for debugging outputs without real sources

use super::{AudioRequest, ItemDescriptor};
use crate::error::{Error, Result};
use crate::playback::{Playback, PCM_CHANNELS, PCM_SAMPLE_RATE};
use async_trait::async_trait;
use chanplay_common::events::SourceKind;
use std::io::Cursor;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const TONE_AMPLITUDE: f64 = 0.25 * i16::MAX as f64;

/// Longest signal a request may ask for (10 minutes, ~115 MB of PCM)
pub const MAX_SYNTHETIC_DURATION_MS: u64 = 600_000;

/// Signal produced by a [`SyntheticRequest`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyntheticSignal {
    Tone { frequency_hz: f64, duration_ms: u64 },
    Silence { duration_ms: u64 },
}

impl SyntheticSignal {
    pub fn duration_ms(&self) -> u64 {
        match self {
            SyntheticSignal::Tone { duration_ms, .. } | SyntheticSignal::Silence { duration_ms } => {
                *duration_ms
            }
        }
    }

    /// Render the signal as s16le interleaved stereo at the wire sample rate
    pub fn render(&self) -> Result<Vec<u8>> {
        let duration_ms = self.duration_ms();
        if duration_ms > MAX_SYNTHETIC_DURATION_MS {
            return Err(Error::InvalidArgument(format!(
                "synthetic duration {} ms exceeds {} ms",
                duration_ms, MAX_SYNTHETIC_DURATION_MS
            )));
        }

        let channels = PCM_CHANNELS as usize;
        let frames = (PCM_SAMPLE_RATE as u64)
            .checked_mul(duration_ms)
            .map(|samples| samples / 1000)
            .and_then(|frames| usize::try_from(frames).ok())
            .ok_or_else(|| {
                Error::InvalidArgument(format!("synthetic duration {} ms too long", duration_ms))
            })?;
        let mut pcm = Vec::with_capacity(frames * channels * 2);

        for n in 0..frames {
            let sample = match self {
                SyntheticSignal::Tone { frequency_hz, .. } => {
                    let t = n as f64 / PCM_SAMPLE_RATE as f64;
                    (TONE_AMPLITUDE * (2.0 * std::f64::consts::PI * frequency_hz * t).sin()) as i16
                }
                SyntheticSignal::Silence { .. } => 0,
            };
            for _ in 0..channels {
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
        }
        Ok(pcm)
    }
}

/// Request whose audio is generated in process
#[derive(Debug, Clone)]
pub struct SyntheticRequest {
    id: Uuid,
    requester: String,
    signal: SyntheticSignal,
}

impl SyntheticRequest {
    pub fn new(signal: SyntheticSignal, requester: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester: requester.to_string(),
            signal,
        }
    }

    pub fn signal(&self) -> SyntheticSignal {
        self.signal
    }
}

#[async_trait]
impl AudioRequest for SyntheticRequest {
    fn id(&self) -> Uuid {
        self.id
    }

    fn requester(&self) -> &str {
        &self.requester
    }

    fn label(&self) -> String {
        match self.signal {
            SyntheticSignal::Tone {
                frequency_hz,
                duration_ms,
            } => format!("tone {} Hz ({} ms)", frequency_hz, duration_ms),
            SyntheticSignal::Silence { duration_ms } => format!("silence ({} ms)", duration_ms),
        }
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Synthetic
    }

    async fn playback(&self, _cancel: &CancellationToken) -> Result<Playback> {
        let signal = self.signal;
        let pcm = tokio::task::spawn_blocking(move || signal.render())
            .await
            .map_err(|e| Error::Playback(format!("signal rendering failed: {}", e)))??;
        Ok(Playback::from_stream(Box::new(Cursor::new(pcm))))
    }

    async fn descriptor(&self, _cancel: &CancellationToken) -> Result<ItemDescriptor> {
        Ok(self.fallback_descriptor())
    }
}
