//! Local file requests

use super::{AudioRequest, ItemDescriptor};
use crate::error::{Error, Result};
use crate::playback::{Playback, TranscodeOptions, Transcoder};
use async_trait::async_trait;
use chanplay_common::events::SourceKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Audio file on the local filesystem
#[derive(Clone)]
pub struct FileRequest {
    id: Uuid,
    requester: String,
    path: PathBuf,
    transcoder: Arc<dyn Transcoder>,
}

impl FileRequest {
    pub fn new(path: impl Into<PathBuf>, requester: &str, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester: requester.to_string(),
            path: path.into(),
            transcoder,
        }
    }
}

impl std::fmt::Debug for FileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRequest")
            .field("id", &self.id)
            .field("requester", &self.requester)
            .field("path", &self.path)
            .finish()
    }
}

/// Open a local file as a transcoded playback
pub(super) async fn open_file_playback(
    path: &Path,
    transcoder: Arc<dyn Transcoder>,
    cancel: &CancellationToken,
) -> Result<Playback> {
    let file = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        file = tokio::fs::File::open(path) => file,
    }
    .map_err(|e| Error::SourceUnavailable(format!("{}: {}", path.display(), e)))?;

    Ok(Playback::from_stream(Box::new(file))
        .with_transcoding(transcoder, TranscodeOptions::default()))
}

pub(super) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[async_trait]
impl AudioRequest for FileRequest {
    fn id(&self) -> Uuid {
        self.id
    }

    fn requester(&self) -> &str {
        &self.requester
    }

    fn label(&self) -> String {
        file_label(&self.path)
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::File
    }

    async fn playback(&self, cancel: &CancellationToken) -> Result<Playback> {
        open_file_playback(&self.path, self.transcoder.clone(), cancel).await
    }

    async fn descriptor(&self, _cancel: &CancellationToken) -> Result<ItemDescriptor> {
        Ok(self.fallback_descriptor())
    }
}
