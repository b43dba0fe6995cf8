//! Version command implementation.

use crate::error::Result;
use crate::model::SourcePlatform;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput {
    version: &'static str,
    build: &'static str,
    sources: [SourcePlatform; 3],
}

/// Print the version and the sources this build can harvest.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let output = VersionOutput {
        version: env!("CARGO_PKG_VERSION"),
        build: if cfg!(debug_assertions) { "dev" } else { "release" },
        sources: SourcePlatform::ALL,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        let sources: Vec<&str> = output.sources.iter().map(SourcePlatform::display_name).collect();
        println!(
            "tsync {} ({}); sources: {}",
            output.version,
            output.build,
            sources.join(", ")
        );
    }
    Ok(())
}
