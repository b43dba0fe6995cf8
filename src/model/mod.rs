//! Data models for threadsync.
//!
//! This module contains all domain models:
//! - SourcePlatform
//! - Thread, Entry, ThreadDetail
//! - Collection
//! - Checkpoint

pub mod checkpoint;
pub mod source;
pub mod thread;

pub use checkpoint::Checkpoint;
pub use source::SourcePlatform;
pub use thread::{Collection, Entry, ExtractionMode, ListPage, Thread, ThreadDetail};
