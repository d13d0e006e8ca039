//! Remote (http/https) requests

use super::{AudioRequest, ItemDescriptor};
use crate::error::{Error, Result};
use crate::playback::{Playback, TranscodeOptions, Transcoder};
use async_trait::async_trait;
use chanplay_common::events::SourceKind;
use futures::TryStreamExt;
use reqwest::{Client, Url};
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Audio downloaded over HTTP
#[derive(Clone)]
pub struct RemoteRequest {
    id: Uuid,
    requester: String,
    url: Url,
    client: Client,
    transcoder: Arc<dyn Transcoder>,
}

impl RemoteRequest {
    /// Validate `raw` as an http(s) URL, optionally restricted to `allowed_hosts`
    pub fn new(
        raw: &str,
        requester: &str,
        allowed_hosts: &[String],
        client: Client,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| Error::Unparseable(format!("{}: {}", raw, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Unparseable(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| Error::Unparseable(format!("{}: missing host", raw)))?;

        if !allowed_hosts.is_empty() && !host_allowed(host, allowed_hosts) {
            return Err(Error::Unparseable(format!("host '{}' is not allowed", host)));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            requester: requester.to_string(),
            url,
            client,
            transcoder,
        })
    }

    async fn fetch(&self) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", self.url, e)))?;

        response
            .error_for_status()
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", self.url, e)))
    }
}

/// Exact host match or subdomain of an allowed host
fn host_allowed(host: &str, allowed_hosts: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    allowed_hosts.iter().any(|allowed| {
        let allowed = allowed.to_ascii_lowercase();
        host == allowed || host.ends_with(&format!(".{}", allowed))
    })
}

impl std::fmt::Debug for RemoteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRequest")
            .field("id", &self.id)
            .field("requester", &self.requester)
            .field("url", &self.url.as_str())
            .finish()
    }
}

#[async_trait]
impl AudioRequest for RemoteRequest {
    fn id(&self) -> Uuid {
        self.id
    }

    fn requester(&self) -> &str {
        &self.requester
    }

    fn label(&self) -> String {
        self.url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
            .or_else(|| self.url.host_str().map(str::to_string))
            .unwrap_or_else(|| self.url.to_string())
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    async fn playback(&self, cancel: &CancellationToken) -> Result<Playback> {
        debug!("Fetching {}", self.url);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.fetch() => response?,
        };

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let reader = StreamReader::new(Box::pin(body));

        Ok(Playback::from_stream(Box::new(reader))
            .with_cache()
            .with_transcoding(self.transcoder.clone(), TranscodeOptions::default()))
    }

    async fn descriptor(&self, _cancel: &CancellationToken) -> Result<ItemDescriptor> {
        Ok(self.fallback_descriptor())
    }
}
