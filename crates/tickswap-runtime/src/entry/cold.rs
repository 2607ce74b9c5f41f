//! Cold strategy: load once at attach, never look again.

use tracing::{debug, error, trace, warn};

use super::{DomainSlot, Entry, EntryState, EntryStats};
use crate::config::StrategyKind;
use crate::domain::{DomainId, ModuleBackend};
use crate::locator::ModuleLocator;

/// Loads the module a single time in `attach`
pub struct ColdEntry {
    slot: DomainSlot,
    state: EntryState,
}

impl ColdEntry {
    /// Create a cold entry
    pub fn new(locator: ModuleLocator, backend: Box<dyn ModuleBackend>) -> Self {
        Self {
            slot: DomainSlot::new(locator, backend),
            state: EntryState::Unloaded,
        }
    }
}

impl Entry for ColdEntry {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cold
    }

    fn attach(&mut self) {
        if self.state == EntryState::Attached {
            warn!("Cold entry already attached");
            return;
        }

        self.slot.locator.init_paths();
        trace!("Module scripting attached: Cold");

        match self.slot.load() {
            Ok(_) => self.state = EntryState::Attached,
            Err(e) => {
                error!("Failed to load module: {}", e);
                self.state = EntryState::Unloaded;
            }
        }
    }

    fn update(&mut self) {
        self.slot.stats.ticks += 1;
        self.slot.update_layers();
    }

    fn detach(&mut self) {
        self.slot.unload();
        self.state = EntryState::Unloaded;
        trace!("Module scripting detached");
    }

    fn reload(&mut self) {
        warn!("Cold strategy does not reload modules; restart the host to pick up a new build");
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
        debug!("Cold strategy ignores check interval {}", ticks);
    }

    fn set_outside_search(&mut self, enabled: bool) {
        self.slot.locator.set_outside_search(enabled);
    }
}

impl Drop for ColdEntry {
    fn drop(&mut self) {
        self.slot.unload();
    }
}
