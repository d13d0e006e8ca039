//! Request parsing
//!
//! Each parser either accepts a raw request string or rejects it with a
//! reason. [`ParserChain`] tries parsers in priority order and reports
//! `Unparseable` only when all of them rejected the input.

use super::synthetic::MAX_SYNTHETIC_DURATION_MS;
use super::{
    FileRequest, RemoteRequest, SharedRequest, StoredRequest, SyntheticRequest, SyntheticSignal,
};
use crate::db::FileStore;
use crate::error::{Error, Result};
use crate::playback::Transcoder;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

/// Result of one parser looking at one input
#[derive(Debug)]
pub enum ParseOutcome {
    Parsed(SharedRequest),
    /// Input is not meant for this parser
    Rejected(String),
}

/// Turns raw request strings into requests
pub trait RequestParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse(&self, raw: &str, requester: &str) -> ParseOutcome;
}

/// Collaborators shared by every request a parser produces
#[derive(Clone)]
pub struct RequestContext {
    pub http: reqwest::Client,
    pub transcoder: Arc<dyn Transcoder>,
    pub store: Option<FileStore>,
    /// Restrict remote requests to these hosts (empty = any host)
    pub allowed_hosts: Vec<String>,
    pub enable_debug_sources: bool,
}

impl RequestContext {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            http: reqwest::Client::new(),
            transcoder,
            store: None,
            allowed_hosts: Vec::new(),
            enable_debug_sources: false,
        }
    }

    pub fn with_store(mut self, store: FileStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.allowed_hosts = hosts;
        self
    }

    pub fn with_debug_sources(mut self, enabled: bool) -> Self {
        self.enable_debug_sources = enabled;
        self
    }
}

/// http/https URLs
pub struct RemoteParser {
    ctx: RequestContext,
}

impl RequestParser for RemoteParser {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn parse(&self, raw: &str, requester: &str) -> ParseOutcome {
        if !(raw.starts_with("http://") || raw.starts_with("https://")) {
            return ParseOutcome::Rejected("not an http(s) URL".to_string());
        }
        match RemoteRequest::new(
            raw,
            requester,
            &self.ctx.allowed_hosts,
            self.ctx.http.clone(),
            self.ctx.transcoder.clone(),
        ) {
            Ok(request) => ParseOutcome::Parsed(Arc::new(request)),
            Err(e) => ParseOutcome::Rejected(e.to_string()),
        }
    }
}

/// `stored:<id>`
pub struct StoredParser {
    store: FileStore,
    transcoder: Arc<dyn Transcoder>,
}

impl RequestParser for StoredParser {
    fn name(&self) -> &'static str {
        "stored"
    }

    fn parse(&self, raw: &str, requester: &str) -> ParseOutcome {
        let Some(id) = raw.strip_prefix("stored:") else {
            return ParseOutcome::Rejected("missing 'stored:' prefix".to_string());
        };
        match id.trim().parse::<i64>() {
            Ok(id) => ParseOutcome::Parsed(Arc::new(StoredRequest::new(
                id,
                requester,
                self.store.clone(),
                self.transcoder.clone(),
            ))),
            Err(_) => ParseOutcome::Rejected(format!("'{}' is not a file id", id)),
        }
    }
}

/// `file:<path>` or an existing absolute path
pub struct FileParser {
    transcoder: Arc<dyn Transcoder>,
}

impl RequestParser for FileParser {
    fn name(&self) -> &'static str {
        "file"
    }

    fn parse(&self, raw: &str, requester: &str) -> ParseOutcome {
        if let Some(path) = raw.strip_prefix("file:") {
            if path.is_empty() {
                return ParseOutcome::Rejected("empty file path".to_string());
            }
            return ParseOutcome::Parsed(Arc::new(FileRequest::new(
                path,
                requester,
                self.transcoder.clone(),
            )));
        }

        let path = Path::new(raw);
        if path.is_absolute() && path.is_file() {
            return ParseOutcome::Parsed(Arc::new(FileRequest::new(
                path,
                requester,
                self.transcoder.clone(),
            )));
        }
        ParseOutcome::Rejected("not a file path".to_string())
    }
}

/// `tone:<hz>:<ms>` and `silence:<ms>`
pub struct SyntheticParser;

impl SyntheticParser {
    fn signal(raw: &str) -> std::result::Result<SyntheticSignal, String> {
        if let Some(rest) = raw.strip_prefix("tone:") {
            let (hz, ms) = rest
                .split_once(':')
                .ok_or_else(|| "expected tone:<hz>:<ms>".to_string())?;
            let frequency_hz: f64 = hz
                .parse()
                .map_err(|_| format!("invalid frequency '{}'", hz))?;
            if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
                return Err(format!("invalid frequency '{}'", hz));
            }
            let duration_ms = Self::duration(ms)?;
            return Ok(SyntheticSignal::Tone {
                frequency_hz,
                duration_ms,
            });
        }
        if let Some(ms) = raw.strip_prefix("silence:") {
            let duration_ms = Self::duration(ms)?;
            return Ok(SyntheticSignal::Silence { duration_ms });
        }
        Err("not a synthetic signal".to_string())
    }

    fn duration(ms: &str) -> std::result::Result<u64, String> {
        let duration_ms: u64 = ms.parse().map_err(|_| format!("invalid duration '{}'", ms))?;
        if duration_ms > MAX_SYNTHETIC_DURATION_MS {
            return Err(format!(
                "duration {} ms exceeds {} ms",
                duration_ms, MAX_SYNTHETIC_DURATION_MS
            ));
        }
        Ok(duration_ms)
    }
}

impl RequestParser for SyntheticParser {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn parse(&self, raw: &str, requester: &str) -> ParseOutcome {
        match Self::signal(raw) {
            Ok(signal) => ParseOutcome::Parsed(Arc::new(SyntheticRequest::new(signal, requester))),
            Err(reason) => ParseOutcome::Rejected(reason),
        }
    }
}

/// Prioritized list of parsers
pub struct ParserChain {
    parsers: Vec<Box<dyn RequestParser>>,
}

impl ParserChain {
    pub fn new(parsers: Vec<Box<dyn RequestParser>>) -> Self {
        Self { parsers }
    }

    /// Standard chain: remote, stored (with a store), file, synthetic (debug only)
    pub fn from_context(ctx: &RequestContext) -> Self {
        let mut parsers: Vec<Box<dyn RequestParser>> = vec![Box::new(RemoteParser { ctx: ctx.clone() })];
        if let Some(store) = &ctx.store {
            parsers.push(Box::new(StoredParser {
                store: store.clone(),
                transcoder: ctx.transcoder.clone(),
            }));
        }
        parsers.push(Box::new(FileParser {
            transcoder: ctx.transcoder.clone(),
        }));
        if ctx.enable_debug_sources {
            parsers.push(Box::new(SyntheticParser));
        }
        Self { parsers }
    }

    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// First successful parse wins
    pub fn parse(&self, raw: &str, requester: &str) -> Result<SharedRequest> {
        let raw = raw.trim();
        let mut reasons = Vec::with_capacity(self.parsers.len());

        for parser in &self.parsers {
            match parser.parse(raw, requester) {
                ParseOutcome::Parsed(request) => {
                    debug!("Parser '{}' accepted request from {}", parser.name(), requester);
                    return Ok(request);
                }
                ParseOutcome::Rejected(reason) => {
                    trace!("Parser '{}' rejected '{}': {}", parser.name(), raw, reason);
                    reasons.push(format!("{}: {}", parser.name(), reason));
                }
            }
        }

        Err(Error::Unparseable(format!("'{}' ({})", raw, reasons.join("; "))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::FfmpegTranscoder;
    use chanplay_common::events::SourceKind;

    fn context() -> RequestContext {
        RequestContext::new(Arc::new(FfmpegTranscoder::default())).with_debug_sources(true)
    }

    #[test]
    fn test_chain_order_without_store() {
        let chain = ParserChain::from_context(&context());
        assert_eq!(chain.parser_names(), vec!["remote", "file", "synthetic"]);
    }

    #[test]
    fn test_debug_sources_disabled() {
        let chain = ParserChain::from_context(&context().with_debug_sources(false));
        assert!(matches!(chain.parse("silence:100", "bob"), Err(Error::Unparseable(_))));
    }

    #[test]
    fn test_each_kind_is_recognized() {
        let chain = ParserChain::from_context(&context());

        let remote = chain.parse("https://example.com/a.mp3", "bob").unwrap();
        assert_eq!(remote.source_kind(), SourceKind::Remote);

        let file = chain.parse("file:/tmp/a.wav", "bob").unwrap();
        assert_eq!(file.source_kind(), SourceKind::File);

        let tone = chain.parse("tone:440:250", "bob").unwrap();
        assert_eq!(tone.source_kind(), SourceKind::Synthetic);
        assert_eq!(tone.requester(), "bob");
    }

    #[test]
    fn test_unparseable_lists_every_rejection() {
        let chain = ParserChain::from_context(&context());
        match chain.parse("play something nice", "bob") {
            Err(Error::Unparseable(msg)) => {
                assert!(msg.contains("remote:"));
                assert!(msg.contains("file:"));
                assert!(msg.contains("synthetic:"));
            }
            other => panic!("expected Unparseable, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_synthetic_rejected() {
        assert!(SyntheticParser::signal("tone:abc:100").is_err());
        assert!(SyntheticParser::signal("tone:440").is_err());
        assert!(SyntheticParser::signal("tone:-5:100").is_err());
        assert!(SyntheticParser::signal("silence:x").is_err());
    }

    #[test]
    fn test_synthetic_duration_is_capped() {
        let longest = format!("silence:{}", MAX_SYNTHETIC_DURATION_MS);
        assert!(SyntheticParser::signal(&longest).is_ok());

        let too_long = format!("tone:440:{}", MAX_SYNTHETIC_DURATION_MS + 1);
        assert!(SyntheticParser::signal(&too_long).is_err());

        let chain = ParserChain::from_context(&context());
        let huge = format!("silence:{}", u64::MAX / 1000);
        assert!(matches!(chain.parse(&huge, "bob"), Err(Error::Unparseable(_))));
    }
}
