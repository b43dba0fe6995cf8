//! Thread browsing commands.

use crate::adapter::ListingCallback;
use crate::cli::commands::Paths;
use crate::cli::commands::shared::{SourceWiring, parse_source, runtime, truncate};
use crate::cli::{DocumentArgs, ThreadCommands};
use crate::error::{Error, Result};
use crate::model::{Thread, ThreadDetail};
use crate::normalize::normalize_detail;
use colored::Colorize;

/// Execute thread commands.
///
/// # Errors
///
/// Configuration errors and listing failures.
pub fn execute(command: &ThreadCommands, paths: &Paths<'_>, json: bool) -> Result<()> {
    match command {
        ThreadCommands::List {
            source,
            offset,
            limit,
        } => list(source, *offset, *limit, paths, json),
        ThreadCommands::All { source } => all(source, paths, json),
        ThreadCommands::Show {
            source,
            id,
            document,
        } => show(source, id, document, paths, json),
    }
}

fn print_threads(threads: &[Thread]) {
    for thread in threads {
        let when = thread
            .last_activity
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:<16} {}  {}",
            when.dimmed(),
            truncate(&thread.title, 60),
            thread.id.dimmed()
        );
    }
}

fn list(source: &str, offset: usize, limit: usize, paths: &Paths<'_>, json: bool) -> Result<()> {
    let source = parse_source(source)?;
    let wiring = SourceWiring::load(paths, &DocumentArgs::default())?;
    let adapter = wiring.registry.get(source)?;

    let page = runtime()?.block_on(adapter.list_items(offset, limit))?;

    if json {
        println!("{}", serde_json::to_string(&page)?);
        return Ok(());
    }
    if page.items.is_empty() {
        println!("No threads at offset {offset}.");
        return Ok(());
    }
    print_threads(&page.items);
    if page.has_more {
        println!();
        println!("More with --offset {}", offset + page.items.len());
    }
    Ok(())
}

fn all(source: &str, paths: &Paths<'_>, json: bool) -> Result<()> {
    let source = parse_source(source)?;
    let wiring = SourceWiring::load(paths, &DocumentArgs::default())?;
    let adapter = wiring.registry.get(source)?;

    let progress: Box<ListingCallback<'static>> = Box::new(move |p| {
        if !json {
            eprint!("\r{} {} threads ({} pages)", "Listing".dimmed(), p.items_seen, p.pages_fetched);
        }
    });
    let threads = runtime()?.block_on(adapter.list_all(Some(progress.as_ref())))?;
    if !json {
        eprintln!();
    }

    if json {
        println!("{}", serde_json::to_string(&threads)?);
    } else {
        print_threads(&threads);
        println!();
        println!("{} threads", threads.len());
    }
    Ok(())
}

fn show(
    source: &str,
    id: &str,
    document: &DocumentArgs,
    paths: &Paths<'_>,
    json: bool,
) -> Result<()> {
    let source = parse_source(source)?;
    let wiring = SourceWiring::load(paths, document)?;
    let adapter = wiring.registry.get(source)?;

    let detail = runtime()?.block_on(adapter.fetch_detail(id));
    if let Some(reason) = &detail.error {
        return Err(Error::Other(format!("could not fetch {source} thread {id}: {reason}")));
    }
    let detail = normalize_detail(detail);

    if json {
        println!("{}", serde_json::to_string(&detail)?);
    } else {
        print_detail(&detail);
    }
    Ok(())
}

fn print_detail(detail: &ThreadDetail) {
    println!("{}", detail.thread.title.bold());
    println!("{}", detail.thread.source.thread_url(&detail.thread.id).dimmed());
    if detail.is_degraded() {
        println!("{}", "Entries recovered from the saved document".yellow());
    }
    for (i, entry) in detail.entries.iter().enumerate() {
        println!();
        println!("{} {}", format!("[{}]", i + 1).cyan(), entry.query.bold());
        println!("{}", entry.answer);
    }
}

/// List a source's collections.
///
/// # Errors
///
/// Configuration errors and listing failures.
pub fn execute_collections(source: &str, paths: &Paths<'_>, json: bool) -> Result<()> {
    let source = parse_source(source)?;
    let wiring = SourceWiring::load(paths, &DocumentArgs::default())?;
    let adapter = wiring.registry.get(source)?;

    let collections = runtime()?.block_on(adapter.list_collections())?;

    if json {
        println!("{}", serde_json::to_string(&collections)?);
        return Ok(());
    }
    if collections.is_empty() {
        println!("No collections on {source}.");
        return Ok(());
    }
    for collection in &collections {
        let count = collection
            .thread_count
            .map(|n| format!(" ({n} threads)"))
            .unwrap_or_default();
        println!("{}{}  {}", collection.title.bold(), count, collection.id.dimmed());
        if let Some(description) = &collection.description {
            println!("    {}", truncate(description, 80).dimmed());
        }
    }
    Ok(())
}
