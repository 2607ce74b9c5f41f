//! `tickswap run` command implementation

use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use tickswap_runtime::{Entry, NativeBackend, SwapConfig, build_entry, logging};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::cli::RunArgs;

/// Execute the `tickswap run` command
pub fn run(args: &RunArgs, verbose: bool) -> anyhow::Result<()> {
    let file_config = match &args.config {
        Some(path) => SwapConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SwapConfig::default(),
    };
    let mut config = args.apply(file_config);
    if verbose {
        config.logging.filter = "debug".to_string();
    }

    logging::init(&config.logging).context("failed to install log subscriber")?;

    if args.tick_rate == 0 {
        anyhow::bail!("tick rate must be at least 1");
    }
    let period = Duration::from_secs_f64(1.0 / f64::from(args.tick_rate));

    println!(
        "{} Running {} strategy on {} at {} Hz",
        "→".green(),
        config.strategy.to_string().cyan(),
        config.locator.root.display(),
        args.tick_rate
    );

    let mut entry = build_entry(&config, Box::new(NativeBackend::new()));

    // The entry is single-threaded; a current-thread runtime keeps every
    // hook on this thread.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = rt.block_on(tick_loop(entry.as_mut(), period, args.max_ticks));

    entry.detach();

    let stats = entry.stats();
    println!(
        "{} Stopped after {} ticks ({} checks, {} loads, {} failed, {} teardowns)",
        "✓".green(),
        stats.ticks,
        stats.checks,
        stats.loads,
        stats.load_failures,
        stats.teardowns
    );
    outcome
}

async fn tick_loop(
    entry: &mut dyn Entry,
    period: Duration,
    max_ticks: Option<u64>,
) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut reload = ReloadSignal::new()?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    entry.attach();

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("Interrupt received, detaching");
                break;
            }
            _ = reload.recv() => {
                entry.reload();
            }
            _ = interval.tick() => {
                entry.update();
                ticks += 1;
                if max_ticks.is_some_and(|max| ticks >= max) {
                    info!("Reached {} ticks", ticks);
                    break;
                }
            }
        }
    }
    Ok(())
}

/// SIGUSR1 as a manual reload trigger; never fires off unix.
struct ReloadSignal {
    #[cfg(unix)]
    inner: Option<tokio::signal::unix::Signal>,
}

impl ReloadSignal {
    fn new() -> anyhow::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let inner = match signal(SignalKind::user_defined1()) {
                Ok(sig) => Some(sig),
                Err(e) => {
                    warn!("Cannot listen for SIGUSR1, manual reload disabled: {}", e);
                    None
                }
            };
            Ok(Self { inner })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if let Some(sig) = self.inner.as_mut() {
                if sig.recv().await.is_some() {
                    return;
                }
                self.inner = None;
            }
        }
        std::future::pending::<()>().await
    }
}
