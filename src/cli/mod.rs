//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// threadsync - incremental harvesting of chat threads into a pages API
#[derive(Parser, Debug)]
#[command(name = "tsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.threadsync/data/threadsync.db)
    #[arg(long, global = true, env = "THREADSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Config file (default: ~/.threadsync/config.json)
    #[arg(long, global = true, env = "THREADSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print version information
    Version,

    /// Sync threads into the export target
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Per-source sync checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },

    /// Items that failed to sync
    Failures {
        #[command(subcommand)]
        command: FailureCommands,
    },

    /// Browse threads on a source
    Threads {
        #[command(subcommand)]
        command: ThreadCommands,
    },

    /// List collections (projects, spaces) on a source
    Collections {
        /// Source platform (chatgpt, claude, perplexity)
        source: String,
    },

    /// Resolve a thread URL to its source and id
    Identify {
        /// Thread URL
        locator: String,
    },

    /// Check that the extraction context is alive
    Ping(DocumentArgs),
}

/// A saved rendering of the thread the user has open.
///
/// Used as the last-resort source of entries when every endpoint fails.
#[derive(Args, Debug, Clone, Default)]
pub struct DocumentArgs {
    /// Saved HTML of the open thread
    #[arg(long, requires = "locator")]
    pub snapshot: Option<PathBuf>,

    /// URL the snapshot was captured from
    #[arg(long, requires = "snapshot")]
    pub locator: Option<String>,
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Run one sync cycle
    Run {
        /// Only sync this source
        #[arg(long)]
        source: Option<String>,

        /// Re-export threads whose fingerprint is unchanged
        #[arg(long)]
        force: bool,

        /// Maximum threads per source this cycle
        #[arg(long)]
        limit: Option<usize>,

        #[command(flatten)]
        document: DocumentArgs,
    },

    /// Run cycles on a timer until interrupted
    Watch {
        /// Seconds between cycles (default: sync.interval_secs)
        #[arg(long)]
        interval: Option<u64>,

        /// Only sync this source
        #[arg(long)]
        source: Option<String>,
    },

    /// Fetch and export one thread by hand
    Retry {
        /// Source platform
        source: String,

        /// Thread id
        id: String,

        /// Export even if unchanged since the last export
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        document: DocumentArgs,
    },

    /// Show checkpoints, exported counts and pending failures
    Status,
}

// ============================================================================
// Checkpoint Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum CheckpointCommands {
    /// Show checkpoints
    Show {
        /// Only this source
        source: Option<String>,
    },

    /// Forget a source's checkpoint; the next cycle rescans its listing
    Reset {
        /// Source platform
        source: String,
    },
}

// ============================================================================
// Failure Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum FailureCommands {
    /// List recent failures, newest first
    List {
        /// Maximum records to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Clear the failure log
    Clear,
}

// ============================================================================
// Thread Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ThreadCommands {
    /// List one page of threads
    List {
        /// Source platform
        source: String,

        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// List every thread on a source
    All {
        /// Source platform
        source: String,
    },

    /// Fetch the entries of one thread
    Show {
        /// Source platform
        source: String,

        /// Thread id
        id: String,

        #[command(flatten)]
        document: DocumentArgs,
    },
}
