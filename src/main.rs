//! threadsync CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use threadsync::cli::commands;
use threadsync::cli::{Cli, Commands};
use threadsync::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let paths = commands::Paths {
        db: cli.db.as_deref(),
        config: cli.config.as_deref(),
    };

    match &cli.command {
        Commands::Version => commands::version::execute(json),
        Commands::Sync { command } => commands::sync::execute(command, &paths, json),
        Commands::Checkpoint { command } => commands::checkpoint::execute(command, &paths, json),
        Commands::Failures { command } => commands::failures::execute(command, &paths, json),
        Commands::Threads { command } => commands::threads::execute(command, &paths, json),
        Commands::Collections { source } => {
            commands::threads::execute_collections(source, &paths, json)
        }
        Commands::Identify { locator } => commands::identify::execute(locator, &paths, json),
        Commands::Ping(args) => commands::ping::execute(args, json),
    }
}
