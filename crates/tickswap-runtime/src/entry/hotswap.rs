//! HotSwap strategy
//!
//! Polls the locator every `check_interval` ticks and, when the canonical file
//! changed, tears the current domain down and loads the new build in its place.
//! The schedule counts host ticks, not wall-clock time.
//!
//! A failed swap leaves the entry `Unloaded`: the previous domain is already
//! gone by the time the new build is opened, since only one domain may exist
//! at a time. The next scheduled check that sees a new build tries again.
//!
//! If no module file has been seen `2 * check_interval` ticks after `attach`,
//! one warning is logged. A module that was found but failed to load does not
//! count as missing.

use tracing::{debug, error, info, info_span, trace, warn};

use super::{DomainSlot, Entry, EntryState, EntryStats};
use crate::config::StrategyKind;
use crate::domain::{DomainId, ModuleBackend};
use crate::error::{LocatorError, ReloadError};
use crate::locator::ModuleLocator;

/// Tick-throttled hot-reload driver
pub struct HotSwapEntry {
    slot: DomainSlot,
    state: EntryState,
    check_interval: u32,
    ticks_since_check: u32,
    missing_countdown: u64,
    module_found: bool,
}

impl HotSwapEntry {
    /// Create a hot-swap entry checking every `check_interval` ticks (`0` = load once at attach)
    pub fn new(
        locator: ModuleLocator,
        backend: Box<dyn ModuleBackend>,
        check_interval: u32,
    ) -> Self {
        Self {
            slot: DomainSlot::new(locator, backend),
            state: EntryState::Unloaded,
            check_interval,
            ticks_since_check: 0,
            missing_countdown: 0,
            module_found: false,
        }
    }

    /// Ticks between modification checks
    pub fn check_interval(&self) -> u32 {
        self.check_interval
    }

    fn check(&mut self) {
        self.slot.stats.checks += 1;
        if self.slot.locator.has_changed() {
            self.module_found = true;
            info!(
                "Found newer module {:?} -> copying",
                self.slot.locator.canonical_path()
            );
            self.swap("modification detected");
        }
    }

    /// Replace whatever is loaded with a fresh domain holding the current build.
    fn swap(&mut self, reason: &str) {
        let span = info_span!("reload", reason);
        let _guard = span.enter();

        self.state = EntryState::Reloading;
        self.slot.unload();
        self.ticks_since_check = 0;

        match self.slot.load() {
            Ok(id) => {
                debug!("Swapped in domain {}", id);
                self.module_found = true;
                self.state = EntryState::Attached;
            }
            Err(e) => {
                error!("Failed to reload module: {}", e);
                if !matches!(
                    e,
                    ReloadError::Locate(LocatorError::MissingModuleFile { .. })
                ) {
                    self.module_found = true;
                }
                self.state = EntryState::Unloaded;
            }
        }
    }
}

impl Entry for HotSwapEntry {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HotSwap
    }

    fn attach(&mut self) {
        self.slot.locator.init_paths();
        self.ticks_since_check = 0;
        self.missing_countdown = u64::from(self.check_interval) * 2;
        self.module_found = false;
        trace!("Module scripting attached: HotSwap");

        // With periodic checks the first load happens on the first check.
        if self.check_interval == 0 {
            self.swap("initial load");
        }
    }

    fn update(&mut self) {
        self.slot.stats.ticks += 1;

        if self.check_interval != 0 {
            self.ticks_since_check += 1;
            if self.ticks_since_check >= self.check_interval {
                self.ticks_since_check = 0;
                self.check();
            }
        }

        self.slot.update_layers();

        if self.missing_countdown > 0 {
            self.missing_countdown -= 1;
            if self.missing_countdown == 0 && !self.module_found {
                warn!(
                    "Cannot find module {:?}",
                    self.slot.locator.canonical_path()
                );
            }
        }
    }

    fn detach(&mut self) {
        self.slot.unload();
        self.state = EntryState::Unloaded;
        self.missing_countdown = 0;
        trace!("Module scripting detached");
    }

    fn reload(&mut self) {
        info!("Manual module reload requested");
        self.swap("manual");
    }

    fn layer_names(&self) -> Vec<String> {
        self.slot.layer_names()
    }

    fn state(&self) -> EntryState {
        self.state
    }

    fn domain_id(&self) -> Option<DomainId> {
        self.slot.domain_id()
    }

    fn stats(&self) -> EntryStats {
        self.slot.stats
    }

    fn locator(&self) -> &ModuleLocator {
        &self.slot.locator
    }

    fn set_check_interval(&mut self, ticks: u32) {
        self.check_interval = ticks;
        self.ticks_since_check = 0;
        // A pending missing-module warning is rescheduled for the new interval.
        if self.missing_countdown > 0 {
            self.missing_countdown = u64::from(ticks) * 2;
        }
    }

    fn set_outside_search(&mut self, enabled: bool) {
        self.slot.locator.set_outside_search(enabled);
    }
}

impl Drop for HotSwapEntry {
    fn drop(&mut self) {
        self.slot.unload();
    }
}
