//! Tickswap CLI - reference host for hot-swappable layer modules

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(&args, cli.verbose),
        Commands::Inspect { path, json } => {
            init_plain_logging(cli.verbose);
            commands::inspect::run(&path, json)
        }
    }
}

fn init_plain_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("warn").init();
    }
}
