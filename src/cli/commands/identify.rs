//! Identify command implementation.

use crate::cli::DocumentArgs;
use crate::cli::commands::Paths;
use crate::cli::commands::shared::SourceWiring;
use crate::error::{Error, Result};
use serde::Serialize;

#[derive(Serialize)]
struct IdentifyOutput<'a> {
    locator: &'a str,
    source: String,
    id: String,
    url: String,
}

/// Resolve a thread URL to its source and id. Makes no network calls.
///
/// # Errors
///
/// Returns `Error::InvalidArgument` if no enabled source recognizes the locator.
pub fn execute(locator: &str, paths: &Paths<'_>, json: bool) -> Result<()> {
    let wiring = SourceWiring::load(paths, &DocumentArgs::default())?;
    let (source, id) = wiring.registry.identify(locator).ok_or_else(|| {
        Error::InvalidArgument(format!("not a recognized thread URL: {locator}"))
    })?;

    if json {
        let output = IdentifyOutput {
            locator,
            source: source.to_string(),
            url: source.thread_url(&id),
            id,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{source} {id}");
    }
    Ok(())
}
