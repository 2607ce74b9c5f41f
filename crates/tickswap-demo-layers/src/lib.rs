//! Demo module for `tickswap run`
//!
//! Build with `cargo build -p tickswap-demo-layers` and point the host at the
//! target directory. Edit a message, rebuild, and the running host swaps the
//! new build in at its next check.
//!
//! Output goes to stdout: the host's `tracing` dispatcher is not shared with
//! loaded modules.

use tickswap_kernel::{Layer, LayerError, LayerRegistration, LayerResult};

/// Prints a line every `every` ticks
pub struct Heartbeat {
    every: u64,
    ticks: u64,
}

impl Heartbeat {
    /// Default period, in ticks
    pub const DEFAULT_EVERY: u64 = 60;

    fn from_env() -> LayerResult<Self> {
        let every = match std::env::var("TICKSWAP_DEMO_HEARTBEAT") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|e| LayerError::failed(format!("bad heartbeat period {raw:?}: {e}")))?,
            Err(_) => Self::DEFAULT_EVERY,
        };
        if every == 0 {
            return Err(LayerError::failed("heartbeat period must be positive"));
        }
        Ok(Self { every, ticks: 0 })
    }
}

impl Layer for Heartbeat {
    fn attach(&mut self) -> LayerResult<()> {
        println!("[heartbeat] attached, beating every {} ticks", self.every);
        Ok(())
    }

    fn update(&mut self) -> LayerResult<()> {
        self.ticks += 1;
        if self.ticks % self.every == 0 {
            println!("[heartbeat] tick {}", self.ticks);
        }
        Ok(())
    }

    fn detach(&mut self) -> LayerResult<()> {
        println!("[heartbeat] detached after {} ticks", self.ticks);
        Ok(())
    }
}

/// Counts updates and reports the total on detach
#[derive(Default)]
pub struct Tally {
    updates: u64,
}

impl Layer for Tally {
    fn attach(&mut self) -> LayerResult<()> {
        println!("[tally] attached");
        Ok(())
    }

    fn update(&mut self) -> LayerResult<()> {
        self.updates += 1;
        Ok(())
    }

    fn detach(&mut self) -> LayerResult<()> {
        println!("[tally] {} updates this load", self.updates);
        Ok(())
    }
}

fn layer_table() -> Vec<LayerRegistration> {
    vec![
        LayerRegistration::with_constructor::<Heartbeat, _>(Heartbeat::from_env),
        LayerRegistration::of::<Tally>(),
    ]
}

tickswap_kernel::declare_layers!(table = layer_table);
