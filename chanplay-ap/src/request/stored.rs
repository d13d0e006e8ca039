//! Requests for files registered in the file store

use super::file::open_file_playback;
use super::{AudioRequest, ItemDescriptor};
use crate::db::{FileStore, StoredFile};
use crate::error::{Error, Result};
use crate::playback::{Playback, Transcoder};
use async_trait::async_trait;
use chanplay_common::events::SourceKind;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// File referenced by its id in the [`FileStore`]
#[derive(Clone)]
pub struct StoredRequest {
    id: Uuid,
    requester: String,
    file_id: i64,
    store: FileStore,
    transcoder: Arc<dyn Transcoder>,
}

impl StoredRequest {
    pub fn new(
        file_id: i64,
        requester: &str,
        store: FileStore,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester: requester.to_string(),
            file_id,
            store,
            transcoder,
        }
    }

    async fn lookup(&self, cancel: &CancellationToken) -> Result<StoredFile> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            file = self.store.get(self.file_id) => file,
        }
    }
}

impl std::fmt::Debug for StoredRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredRequest")
            .field("id", &self.id)
            .field("requester", &self.requester)
            .field("file_id", &self.file_id)
            .finish()
    }
}

#[async_trait]
impl AudioRequest for StoredRequest {
    fn id(&self) -> Uuid {
        self.id
    }

    fn requester(&self) -> &str {
        &self.requester
    }

    fn label(&self) -> String {
        format!("stored file #{}", self.file_id)
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Stored
    }

    async fn playback(&self, cancel: &CancellationToken) -> Result<Playback> {
        let file = self.lookup(cancel).await.map_err(|e| match e {
            Error::NotFound(what) => Error::SourceUnavailable(format!("{} does not exist", what)),
            other => other,
        })?;
        open_file_playback(&file.path, self.transcoder.clone(), cancel).await
    }

    async fn descriptor(&self, cancel: &CancellationToken) -> Result<ItemDescriptor> {
        let file = self.lookup(cancel).await?;
        Ok(ItemDescriptor {
            name: file.filename,
            requester: self.requester.clone(),
            source: SourceKind::Stored,
        })
    }
}
