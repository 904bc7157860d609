//! entrypoint — container init: render templates, run hooks, then
//! supervise a single child command as PID 1.
//!
//! All logs go to stderr; stdout belongs to the child.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use entrypoint::cli::Cli;
use entrypoint::error::Error;
use entrypoint::rewrite::SignalMap;
use entrypoint::{init, supervisor};

fn main() {
    // clap reports usage errors with exit code 2 by default; the CLI
    // contract is exit 1 with the message on stderr.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{e:#}");
            let code = e.downcast_ref::<Error>().map(Error::exit_code).unwrap_or(1);
            std::process::exit(code);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    // Validate the whole command line before any side effects.
    let map = SignalMap::build(&cli.rewrite)?;
    let command = cli.exec_vector()?.to_vec();

    init::run(&cli.init_paths())?;

    if cli.no_init {
        // Replace the process image; only returns on failure.
        return Err(supervisor::exec(&command).into());
    }

    let code = supervisor::run(&command, map, !cli.no_setsid)?;
    Ok(code)
}
