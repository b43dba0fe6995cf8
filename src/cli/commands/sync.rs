//! Sync command implementations.

use crate::cli::commands::Paths;
use crate::cli::commands::shared::{SourceWiring, open_store, parse_source, runtime, truncate};
use crate::cli::{DocumentArgs, SyncCommands};
use crate::config::Config;
use crate::error::Result;
use crate::sync::{
    CheckpointStore, CycleOutcome, CycleReport, ExportLedger, FailureLog, ItemOutcome,
    ItemResult, ProgressCallback, SourceState, SyncOptions, SyncProgress, run_scheduled,
};
use colored::Colorize;
use serde::Serialize;
use std::time::Duration;

/// Execute sync commands.
///
/// # Errors
///
/// Configuration, store and credential errors. Per-item failures are
/// reported, not returned.
pub fn execute(command: &SyncCommands, paths: &Paths<'_>, json: bool) -> Result<()> {
    match command {
        SyncCommands::Run {
            source,
            force,
            limit,
            document,
        } => run(source.as_deref(), *force, *limit, document, paths, json),
        SyncCommands::Watch { interval, source } => {
            watch(*interval, source.as_deref(), paths, json)
        }
        SyncCommands::Retry {
            source,
            id,
            force,
            document,
        } => retry(source, id, *force, document, paths, json),
        SyncCommands::Status => status(paths, json),
    }
}

fn options(source: Option<&str>, force: bool, limit: Option<usize>) -> Result<SyncOptions> {
    Ok(SyncOptions {
        sources: source.map(parse_source).transpose()?.map(|s| vec![s]),
        force,
        max_items: limit,
    })
}

/// Prints one line per item as the cycle goes.
fn progress_printer() -> ProgressCallback {
    Box::new(|event| match event {
        SyncProgress::ListingSource { source } => {
            println!("{} {source}...", "Listing".dimmed());
        }
        SyncProgress::Filtered {
            listed,
            candidates,
            batch,
            ..
        } => {
            println!("  {listed} threads, {candidates} new, syncing {batch}");
        }
        SyncProgress::SourceFailed { source, error } => {
            println!("  {} {source}: {error}", "!".red());
        }
        SyncProgress::Exported {
            title, degraded, ..
        } => {
            let note = if degraded { " (from document)" } else { "" };
            println!("  {} {}{}", "✓".green(), truncate(&title, 60), note.yellow());
        }
        SyncProgress::Unchanged { id, .. } => {
            println!("  {} {} unchanged", "=".dimmed(), id.dimmed());
        }
        SyncProgress::ItemFailed { id, error, .. } => {
            println!("  {} {id}: {error}", "✗".red());
        }
        _ => {}
    })
}

fn run(
    source: Option<&str>,
    force: bool,
    limit: Option<usize>,
    document: &DocumentArgs,
    paths: &Paths<'_>,
    json: bool,
) -> Result<()> {
    let options = options(source, force, limit)?;
    let wiring = SourceWiring::load(paths, document)?;
    let store = open_store(paths)?;

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let engine = wiring.engine(store)?;
        let progress = (!json).then(progress_printer);
        engine.run_cycle(&options, progress.as_ref()).await
    })?;

    if json {
        println!("{}", serde_json::to_string(&outcome)?);
        return Ok(());
    }
    match outcome {
        CycleOutcome::Skipped => println!("A sync cycle is already running; nothing to do."),
        CycleOutcome::Completed(report) => print_summary(&report),
    }
    Ok(())
}

fn print_summary(report: &CycleReport) {
    println!();
    for source in &report.sources {
        if let Some(error) = &source.error {
            println!("{}: {}", source.source, error.red());
            continue;
        }
        let backlog = if source.backlog > 0 {
            format!(", {} left for the next cycle", source.backlog)
        } else {
            String::new()
        };
        println!(
            "{}: {} exported, {} unchanged, {} failed{}",
            source.source.to_string().bold(),
            source.exported(),
            source.unchanged(),
            source.failed(),
            backlog
        );
    }
    if report.failed() > 0 {
        println!("Run `tsync failures list` for details.");
    }
}

fn watch(interval: Option<u64>, source: Option<&str>, paths: &Paths<'_>, json: bool) -> Result<()> {
    let options = options(source, false, None)?;
    let wiring = SourceWiring::load(paths, &DocumentArgs::default())?;
    let store = open_store(paths)?;
    let interval = Duration::from_secs(interval.unwrap_or(wiring.config.sync.interval_secs));

    let rt = runtime()?;
    let summary = rt.block_on(async {
        let engine = wiring.engine(store)?;
        if !json {
            println!("Syncing every {}s. Press Ctrl-C to stop.", interval.as_secs());
        }
        let progress = (!json).then(progress_printer);
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        Ok::<_, crate::error::Error>(
            run_scheduled(&engine, &options, interval, progress.as_ref(), shutdown).await,
        )
    })?;

    if json {
        let output = serde_json::json!({
            "completed": summary.completed,
            "skipped": summary.skipped,
            "failed": summary.failed,
        });
        println!("{output}");
    } else {
        println!(
            "Stopped after {} cycles ({} skipped, {} failed).",
            summary.completed, summary.skipped, summary.failed
        );
    }
    Ok(())
}

fn retry(
    source: &str,
    id: &str,
    force: bool,
    document: &DocumentArgs,
    paths: &Paths<'_>,
    json: bool,
) -> Result<()> {
    let source = parse_source(source)?;
    let wiring = SourceWiring::load(paths, document)?;
    let store = open_store(paths)?;

    let rt = runtime()?;
    let item = rt.block_on(async {
        let engine = wiring.engine(store)?;
        engine.retry_item(source, id, force).await
    })?;

    if json {
        println!("{}", serde_json::to_string(&item)?);
    } else {
        print_item(&item);
    }
    Ok(())
}

fn print_item(item: &ItemResult) {
    match &item.outcome {
        ItemOutcome::Exported {
            page_id,
            url,
            calls,
            degraded,
            ..
        } => {
            println!("{} Exported {} {}", "✓".green(), item.source, item.id);
            println!("  Page:  {}", url.as_deref().unwrap_or(page_id));
            println!("  Calls: {calls}");
            if *degraded {
                println!("  {}", "Entries were recovered from the saved document".yellow());
            }
        }
        ItemOutcome::Unchanged => {
            println!("{} {} is unchanged since its last export (use --force)", "=".dimmed(), item.id);
        }
        ItemOutcome::Failed { reason } => {
            println!("{} {} {}: {reason}", "✗".red(), item.source, item.id);
        }
    }
}

#[derive(Serialize)]
struct StatusOutput {
    sources: Vec<SourceState>,
    failures: usize,
}

fn status(paths: &Paths<'_>, json: bool) -> Result<()> {
    let config = Config::load(paths.config)?;
    let store = open_store(paths)?;
    let checkpoints = CheckpointStore::new(store.clone());
    let ledger = ExportLedger::new(store.clone());
    let failures = FailureLog::new(store);

    let mut sources = Vec::new();
    for source in config.enabled_sources() {
        sources.push(SourceState {
            source,
            checkpoint: checkpoints.load(source)?,
            exported: ledger.exported_ids(source)?.len(),
        });
    }
    let output = StatusOutput {
        sources,
        failures: failures.list()?.len(),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", "Sync status".bold());
    for state in &output.sources {
        let last = state
            .checkpoint
            .last_sync_time
            .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string());
        println!(
            "  {:<11} last sync {}  exported {}",
            state.source.to_string(),
            last,
            state.exported
        );
    }
    if output.sources.is_empty() {
        println!("  No sources enabled.");
    }
    if output.failures > 0 {
        println!();
        println!("{} failed items; see `tsync failures list`", output.failures.to_string().yellow());
    }
    Ok(())
}
