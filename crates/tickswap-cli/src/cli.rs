//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tickswap_runtime::{StrategyKind, SwapConfig};

/// Tickswap - drive hot-swappable layer modules from a tick loop
#[derive(Parser)]
#[command(name = "tickswap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the tick loop with the configured entry strategy
    Run(RunArgs),

    /// Load a module in a throwaway domain and list its layers
    Inspect {
        /// Module library file
        path: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Options for `tickswap run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Configuration file (toml, yaml, json, ...)
    #[arg(short, long, env = "TICKSWAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the canonical module file
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Module name, without platform prefix or extension
    #[arg(short, long)]
    pub module: Option<String>,

    /// Entry strategy (cold, hotswap)
    #[arg(short, long)]
    pub strategy: Option<StrategyKind>,

    /// Ticks between modification checks (0 = load once at attach)
    #[arg(short = 'k', long)]
    pub check_interval: Option<u32>,

    /// Allow the module to be found outside the root directory
    #[arg(long)]
    pub outside_search: bool,

    /// Host ticks per second
    #[arg(long, default_value_t = 60)]
    pub tick_rate: u32,

    /// Stop after this many ticks
    #[arg(long)]
    pub max_ticks: Option<u64>,
}

impl RunArgs {
    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply(&self, mut config: SwapConfig) -> SwapConfig {
        if let Some(root) = &self.root {
            config.locator.root = root.clone();
        }
        if let Some(module) = &self.module {
            config.locator.module_name = module.clone();
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(ticks) = self.check_interval {
            config.check_interval = ticks;
        }
        if self.outside_search {
            config.outside_search = true;
        }
        config
    }
}
