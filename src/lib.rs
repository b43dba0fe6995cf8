//! threadsync - incremental harvesting of chat threads into a pages API
//!
//! This crate provides the core functionality for the `tsync` CLI tool.
//!
//! # Architecture
//!
//! - [`adapter`] - Per-platform source adapters with API → DOM degradation
//! - [`normalize`] - Canonical entries, role pairing, fingerprints
//! - [`dom`] - Generic document tree and structural extractors
//! - [`dispatch`] - Rate-limited, retrying write queue
//! - [`export`] - Page rendering and the Notion client
//! - [`sync`] - Checkpointed sync engine
//! - [`storage`] - Key-value store (SQLite, memory)
//! - [`http`] - HTTP transport boundary
//! - [`clock`] - Injectable time
//! - [`health`] - Liveness check
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod dom;
pub mod error;
pub mod export;
pub mod health;
pub mod http;
pub mod model;
pub mod normalize;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
