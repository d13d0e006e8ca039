//! Audio requests
//!
//! A request names one piece of audio and knows how to build its playback
//! pipeline. Requests are immutable once parsed; the preloader consumes each
//! one exactly once.
//!
//! | Variant | Input | Pipeline |
//! |---------|-------|----------|
//! | [`RemoteRequest`] | http(s) URL | Source → Cache → Transcode |
//! | [`StoredRequest`] | `stored:<id>` | Source → Transcode |
//! | [`FileRequest`] | `file:<path>` or absolute path | Source → Transcode |
//! | [`SyntheticRequest`] | `tone:<hz>:<ms>`, `silence:<ms>` | Source (already PCM) |

mod file;
pub mod parser;
mod remote;
mod stored;
mod synthetic;

pub use file::FileRequest;
pub use parser::{ParseOutcome, ParserChain, RequestContext, RequestParser};
pub use remote::RemoteRequest;
pub use stored::StoredRequest;
pub use synthetic::{SyntheticRequest, SyntheticSignal, MAX_SYNTHETIC_DURATION_MS};

use crate::error::Result;
use crate::playback::Playback;
use async_trait::async_trait;
use chanplay_common::events::{RequestInfo, SourceKind};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Display metadata for one queued request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDescriptor {
    pub name: String,
    pub requester: String,
    pub source: SourceKind,
}

/// A playable request
#[async_trait]
pub trait AudioRequest: Send + Sync + fmt::Debug {
    fn id(&self) -> Uuid;

    fn requester(&self) -> &str;

    /// Short display string available without any I/O
    fn label(&self) -> String;

    fn source_kind(&self) -> SourceKind;

    /// Resolve the request into a playback pipeline
    ///
    /// Fails with `SourceUnavailable` when the source cannot be opened.
    async fn playback(&self, cancel: &CancellationToken) -> Result<Playback>;

    /// Resolve display metadata; may need a network or store round trip
    async fn descriptor(&self, cancel: &CancellationToken) -> Result<ItemDescriptor>;

    /// Event payload identifying this request
    fn info(&self) -> RequestInfo {
        RequestInfo {
            id: self.id(),
            requester: self.requester().to_string(),
            label: self.label(),
            source: self.source_kind(),
        }
    }

    /// Descriptor built from the label alone
    fn fallback_descriptor(&self) -> ItemDescriptor {
        ItemDescriptor {
            name: self.label(),
            requester: self.requester().to_string(),
            source: self.source_kind(),
        }
    }
}

/// Shared handle to a request
pub type SharedRequest = Arc<dyn AudioRequest>;
