//! Ping command implementation.

use crate::cli::DocumentArgs;
use crate::cli::commands::shared::{load_document, system_clock};
use crate::error::{Error, Result};
use crate::health::ping;
use colored::Colorize;

/// Report whether the extraction context is alive.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be read or is unhealthy.
pub fn execute(args: &DocumentArgs, json: bool) -> Result<()> {
    let document = load_document(args)?;
    let clock = system_clock();
    let status = ping(clock.as_ref(), document.as_deref());

    if json {
        println!("{}", serde_json::to_string(&status)?);
    } else if status.healthy {
        println!("{} healthy at {}", "✓".green(), status.timestamp.to_rfc3339());
    } else {
        println!(
            "{} unhealthy: {}",
            "✗".red(),
            status.detail.as_deref().unwrap_or("unknown")
        );
    }

    if status.healthy {
        Ok(())
    } else {
        Err(Error::Validation(
            status.detail.unwrap_or_else(|| "document unavailable".to_string()),
        ))
    }
}
