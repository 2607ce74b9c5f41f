//! Entry strategies
//!
//! The host drives exactly one [`Entry`] for the whole run: `attach` once,
//! `update` every tick, `detach` on shutdown. Which strategy is used is decided
//! once at startup with [`build_entry`].

mod cold;
mod hotswap;

use std::fmt;

use tracing::{debug, info, info_span, trace, warn};

use crate::config::{StrategyKind, SwapConfig};
use crate::domain::{DomainId, DomainSetup, ModuleBackend, ModuleDomain};
use crate::error::ReloadError;
use crate::locator::ModuleLocator;

pub use cold::ColdEntry;
pub use hotswap::HotSwapEntry;

/// Friendly name given to every module domain
pub const DOMAIN_NAME: &str = "tickswap-domain";

/// Lifecycle state of an entry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryState {
    /// No module domain
    #[default]
    Unloaded,
    /// A module is loaded and attached
    Attached,
    /// A swap is in progress
    Reloading,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Unloaded => write!(f, "Unloaded"),
            EntryState::Attached => write!(f, "Attached"),
            EntryState::Reloading => write!(f, "Reloading"),
        }
    }
}

/// Counters kept by an entry strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryStats {
    /// `update` calls
    pub ticks: u64,
    /// Modification checks performed
    pub checks: u64,
    /// Successful loads
    pub loads: u64,
    /// Failed load attempts
    pub load_failures: u64,
    /// Domains destroyed
    pub teardowns: u64,
}

/// A driver of the module lifecycle, called from the host's tick thread
pub trait Entry {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Called once when the host starts
    fn attach(&mut self);

    /// Called once per host tick
    fn update(&mut self);

    /// Called on shutdown; safe to call repeatedly and from any state
    fn detach(&mut self);

    /// Force a reload now, outside the check schedule
    fn reload(&mut self);

    /// Display names of the active layers, in discovery order
    fn layer_names(&self) -> Vec<String>;

    /// Current lifecycle state
    fn state(&self) -> EntryState;

    /// Identity of the active domain, if any
    fn domain_id(&self) -> Option<DomainId>;

    /// Counters
    fn stats(&self) -> EntryStats;

    /// The module locator
    fn locator(&self) -> &ModuleLocator;

    /// Set the ticks between modification checks
    fn set_check_interval(&mut self, ticks: u32);

    /// Allow the module to be found outside the configured root
    fn set_outside_search(&mut self, enabled: bool);
}

/// Build the entry strategy selected by `config`.
pub fn build_entry(config: &SwapConfig, backend: Box<dyn ModuleBackend>) -> Box<dyn Entry> {
    let locator =
        ModuleLocator::new(config.locator.clone()).with_outside_search(config.outside_search);

    info!("Module entry strategy: {}", config.strategy);
    match config.strategy {
        StrategyKind::Cold => Box::new(ColdEntry::new(locator, backend)),
        StrategyKind::HotSwap => Box::new(HotSwapEntry::new(
            locator,
            backend,
            config.check_interval,
        )),
    }
}

/// The one module domain an entry owns, with the collaborators needed to
/// replace it.
pub(crate) struct DomainSlot {
    pub(crate) locator: ModuleLocator,
    backend: Box<dyn ModuleBackend>,
    domain: Option<ModuleDomain>,
    pub(crate) stats: EntryStats,
}

impl DomainSlot {
    pub(crate) fn new(locator: ModuleLocator, backend: Box<dyn ModuleBackend>) -> Self {
        Self {
            locator,
            backend,
            domain: None,
            stats: EntryStats::default(),
        }
    }

    pub(crate) fn domain_id(&self) -> Option<DomainId> {
        self.domain.as_ref().map(ModuleDomain::id)
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.domain.is_some()
    }

    pub(crate) fn layer_names(&self) -> Vec<String> {
        self.domain
            .as_ref()
            .map(ModuleDomain::layer_names)
            .unwrap_or_default()
    }

    pub(crate) fn update_layers(&mut self) {
        if let Some(domain) = self.domain.as_mut() {
            domain.update_layers();
        }
    }

    fn setup(&self) -> DomainSetup {
        let locator = &self.locator;
        let base_dir = locator
            .canonical_path()
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| locator.config().root.clone());

        let mut setup = DomainSetup::new(DOMAIN_NAME, base_dir)
            .with_outside_search(locator.outside_search());
        if let Some(staging_dir) = locator.staging_path().parent() {
            setup = setup.with_search_dir(staging_dir);
        }
        if locator.outside_search() {
            for dir in &locator.config().outside_dirs {
                setup = setup.with_search_dir(dir);
            }
        }
        for name in &locator.config().companions {
            setup = setup.with_companion(name.as_str());
        }
        setup
    }

    /// Stage the current build, create a domain, load it and attach its layers.
    ///
    /// On failure no domain is kept.
    pub(crate) fn load(&mut self) -> Result<DomainId, ReloadError> {
        let result = self.try_load();
        if result.is_err() {
            self.stats.load_failures += 1;
        }
        result
    }

    fn try_load(&mut self) -> Result<DomainId, ReloadError> {
        debug_assert!(self.domain.is_none(), "previous domain must be torn down first");

        let staged = self.locator.stage_copy()?;
        let mut domain = ModuleDomain::create(self.setup());
        let id = domain.id();

        let span = info_span!("domain", id = %id);
        let _guard = span.enter();
        trace!("Application base is: {:?}", domain.setup().base_dir);

        if let Err(e) = domain.load_from(self.backend.as_ref(), &staged) {
            self.destroy(domain);
            return Err(e.into());
        }

        if let Some(report) = domain.attach_layers() {
            if !report.is_clean() {
                warn!(
                    "{} of {} layer(s) failed to attach",
                    report.failures.len(),
                    report.invoked
                );
            }
        }

        info!("Module attached: {:?}", domain.layer_names());
        self.stats.loads += 1;
        self.domain = Some(domain);
        Ok(id)
    }

    /// Detach and destroy the current domain, if any.
    pub(crate) fn unload(&mut self) {
        if let Some(mut domain) = self.domain.take() {
            domain.detach_layers();
            self.destroy(domain);
        }
    }

    fn destroy(&mut self, domain: ModuleDomain) {
        let id = domain.id();
        if let Err(e) = domain.destroy() {
            warn!("Domain {} teardown failed: {}", id, e);
        }
        self.stats.teardowns += 1;
        debug!("Domain {} destroyed", id);
    }
}
