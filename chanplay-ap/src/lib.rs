//! # chanplay Audio Player Library (chanplay-ap)
//!
//! Per-channel sequential audio playback with bounded lookahead preloading.
//!
//! **Purpose:** Accept audio requests for destination channels, resolve them
//! ahead of time, and stream them back to back as PCM into one output sink
//! per channel, with skip/clear control and an HTTP/SSE interface.
//!
//! **Architecture:** request parsers → [`worker::Worker`] (preloader + player
//! loop + skip coordinator) → [`sink::OutputSink`], managed by
//! [`registry::ChannelRegistry`].

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod playback;
pub mod registry;
pub mod request;
pub mod sink;
pub mod worker;

pub use error::{Error, Result};
pub use registry::ChannelRegistry;
pub use worker::Worker;
