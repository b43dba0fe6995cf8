//! Checkpoint command implementations.

use crate::cli::CheckpointCommands;
use crate::cli::commands::Paths;
use crate::cli::commands::shared::{open_store, parse_source};
use crate::error::Result;
use crate::model::{Checkpoint, SourcePlatform};
use crate::sync::CheckpointStore;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct CheckpointRow {
    source: SourcePlatform,
    #[serde(flatten)]
    checkpoint: Checkpoint,
}

/// Execute checkpoint commands.
///
/// # Errors
///
/// Unknown sources and store errors.
pub fn execute(command: &CheckpointCommands, paths: &Paths<'_>, json: bool) -> Result<()> {
    let checkpoints = CheckpointStore::new(open_store(paths)?);
    match command {
        CheckpointCommands::Show { source } => show(&checkpoints, source.as_deref(), json),
        CheckpointCommands::Reset { source } => reset(&checkpoints, source, json),
    }
}

fn show(checkpoints: &CheckpointStore, source: Option<&str>, json: bool) -> Result<()> {
    let sources = match source {
        Some(s) => vec![parse_source(s)?],
        None => SourcePlatform::ALL.to_vec(),
    };
    let mut rows = Vec::with_capacity(sources.len());
    for source in sources {
        rows.push(CheckpointRow {
            source,
            checkpoint: checkpoints.load(source)?,
        });
    }

    if json {
        println!("{}", serde_json::to_string(&rows)?);
        return Ok(());
    }

    for row in &rows {
        match row.checkpoint.last_sync_time {
            Some(time) => println!(
                "{:<11} {}  last seen {}",
                row.source.to_string(),
                time.to_rfc3339(),
                row.checkpoint.last_seen_id.as_deref().unwrap_or("-").dimmed()
            ),
            None => println!("{:<11} {}", row.source.to_string(), "never synced".dimmed()),
        }
    }
    Ok(())
}

fn reset(checkpoints: &CheckpointStore, source: &str, json: bool) -> Result<()> {
    let source = parse_source(source)?;
    checkpoints.reset(source)?;

    if json {
        let output = serde_json::json!({ "source": source, "reset": true });
        println!("{output}");
    } else {
        println!("Checkpoint for {source} reset; the next cycle rescans its listing.");
    }
    Ok(())
}
