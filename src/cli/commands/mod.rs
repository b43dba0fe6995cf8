//! Command implementations.

pub mod checkpoint;
pub mod failures;
pub mod identify;
pub mod ping;
mod shared;
pub mod sync;
pub mod threads;
pub mod version;

use std::path::Path;

/// File locations given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Paths<'a> {
    pub db: Option<&'a Path>,
    pub config: Option<&'a Path>,
}
