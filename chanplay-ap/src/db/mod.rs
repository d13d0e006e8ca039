//! File store access layer
//!
//! Stored requests reference rows of the `files` table by numeric id.

pub mod files;

pub use files::{FileStore, StoredFile};
