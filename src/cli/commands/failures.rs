//! Failure log command implementations.

use crate::cli::FailureCommands;
use crate::cli::commands::Paths;
use crate::cli::commands::shared::{open_store, truncate};
use crate::error::Result;
use crate::sync::FailureLog;
use colored::Colorize;

/// Execute failure log commands.
///
/// # Errors
///
/// Store errors.
pub fn execute(command: &FailureCommands, paths: &Paths<'_>, json: bool) -> Result<()> {
    let log = FailureLog::new(open_store(paths)?);
    match command {
        FailureCommands::List { limit } => list(&log, *limit, json),
        FailureCommands::Clear => clear(&log, json),
    }
}

fn list(log: &FailureLog, limit: usize, json: bool) -> Result<()> {
    let records: Vec<_> = log.list()?.into_iter().take(limit).collect();

    if json {
        println!("{}", serde_json::to_string(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No failures recorded.");
        return Ok(());
    }

    for record in &records {
        let title = if record.title.is_empty() {
            String::new()
        } else {
            format!(" {}", truncate(&record.title, 50))
        };
        println!(
            "{} {} {}{}",
            record.at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            record.source,
            record.id.cyan(),
            title
        );
        let attempts = if record.attempts > 1 {
            format!(" (failed {} times)", record.attempts)
        } else {
            String::new()
        };
        println!("    {}{}", record.reason.red(), attempts.dimmed());
    }
    println!();
    println!("Retry one with `tsync sync retry <source> <id>`.");
    Ok(())
}

fn clear(log: &FailureLog, json: bool) -> Result<()> {
    let cleared = log.clear()?;
    if json {
        println!("{}", serde_json::json!({ "cleared": cleared }));
    } else {
        println!("Cleared {cleared} failure records.");
    }
    Ok(())
}
