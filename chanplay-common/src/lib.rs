//! # chanplay Common Library
//!
//! Shared code for the chanplay crates including:
//! - Bootstrap configuration loading (TOML) and config file resolution
//! - Channel event types and the per-worker event bus
//! - Server-Sent Events helpers
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
pub use events::{validate_channel_id, ChannelEvent, ChannelId, EventBus, RequestInfo};
