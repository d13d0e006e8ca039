//! Transcoding stage and the external transcoder boundary
//!
//! Everything is normalized to the PCM wire format: 48 kHz, stereo, s16le.
//! [`FfmpegTranscoder`] pipes the inner stream through an `ffmpeg` child
//! process and buffers its stdout.

use super::{AudioStream, Playback, PCM_CHANNELS, PCM_SAMPLE_RATE};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Target format for transcoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOptions {
    pub sample_rate: u32,
    pub channels: u16,
    /// Output sample format as named by ffmpeg (`s16le`)
    pub sample_format: String,
    /// Container hint for pipe input that cannot be probed
    pub input_format: Option<String>,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            sample_rate: PCM_SAMPLE_RATE,
            channels: PCM_CHANNELS,
            sample_format: "s16le".to_string(),
            input_format: None,
        }
    }
}

impl TranscodeOptions {
    pub fn with_input_format(mut self, format: impl Into<String>) -> Self {
        self.input_format = Some(format.into());
        self
    }
}

/// Converts an arbitrary audio stream to raw PCM
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input: AudioStream,
        options: &TranscodeOptions,
        cancel: &CancellationToken,
    ) -> Result<Bytes>;
}

/// Transcoder backed by the ffmpeg command line tool
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, options: &TranscodeOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        if let Some(format) = &options.input_format {
            cmd.args(["-f", format]);
        }
        cmd.args(["-i", "pipe:0"])
            .args(["-ac", &options.channels.to_string()])
            .args(["-ar", &options.sample_rate.to_string()])
            .args(["-acodec", &format!("pcm_{}", options.sample_format)])
            .args(["-f", &options.sample_format])
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: AudioStream,
        options: &TranscodeOptions,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let mut child = self.command(options).spawn().map_err(|e| {
            Error::Transcode(format!("failed to start {}: {}", self.program.display(), e))
        })?;
        debug!("Started transcoder {} (pid {:?})", self.program.display(), child.id());

        // Dropping the child on cancellation kills the process.
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = run_child(&mut child, input) => result,
        }
    }
}

async fn run_child(child: &mut Child, mut input: AudioStream) -> Result<Bytes> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Transcode("transcoder stdin unavailable".to_string()))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Transcode("transcoder stdout unavailable".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Transcode("transcoder stderr unavailable".to_string()))?;

    let feed = async move {
        let result = tokio::io::copy(&mut input, &mut stdin).await;
        drop(stdin);
        result
    };
    let collect = async {
        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await.map(|_| out)
    };
    let diagnostics = async {
        let mut text = String::new();
        let _ = stderr.read_to_string(&mut text).await;
        text
    };

    let (fed, collected, diagnostics) = tokio::join!(feed, collect, diagnostics);
    let status = child.wait().await?;

    if !status.success() {
        return Err(Error::Transcode(format!(
            "transcoder exited with {}: {}",
            status,
            diagnostics.trim()
        )));
    }
    if let Err(e) = fed {
        // ffmpeg may stop reading once it has what it needs
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(Error::SourceUnavailable(format!("failed reading source: {}", e)));
        }
        debug!("Transcoder closed its input early");
    }
    let out = collected?;
    if out.is_empty() {
        warn!("Transcoder produced no audio");
    }
    Ok(Bytes::from(out))
}

/// Pipeline stage that transcodes its inner stream on open
pub struct TranscodedPlayback {
    inner: Box<Playback>,
    transcoder: Arc<dyn Transcoder>,
    options: TranscodeOptions,
}

impl TranscodedPlayback {
    pub(super) fn new(
        inner: Playback,
        transcoder: Arc<dyn Transcoder>,
        options: TranscodeOptions,
    ) -> Self {
        Self {
            inner: Box::new(inner),
            transcoder,
            options,
        }
    }

    pub(super) async fn open(&mut self, cancel: &CancellationToken) -> Result<AudioStream> {
        let input = self.inner.open(cancel).await?;
        let pcm = self.transcoder.transcode(input, &self.options, cancel).await?;
        Ok(Box::new(Cursor::new(pcm)))
    }

    pub(super) fn dispose(&mut self) {
        self.inner.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_match_wire_format() {
        let options = TranscodeOptions::default();
        assert_eq!(options.sample_rate, 48_000);
        assert_eq!(options.channels, 2);
        assert_eq!(options.sample_format, "s16le");
        assert!(options.input_format.is_none());
    }

    #[test]
    fn test_ffmpeg_arguments() {
        let transcoder = FfmpegTranscoder::new("/opt/ffmpeg");
        let cmd = transcoder.command(&TranscodeOptions::default().with_input_format("ogg"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let joined = args.join(" ");
        assert!(joined.contains("-f ogg -i pipe:0"));
        assert!(joined.contains("-ac 2"));
        assert!(joined.contains("-ar 48000"));
        assert!(joined.contains("-acodec pcm_s16le -f s16le pipe:1"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_transcode_error() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/chanplay-ffmpeg");
        let input: AudioStream = Box::new(Cursor::new(vec![0u8; 16]));
        let err = transcoder
            .transcode(input, &TranscodeOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transcode(_)));
    }
}
