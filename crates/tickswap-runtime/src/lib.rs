//! Tickswap Runtime
//!
//! Hot-reload core for a tick-driven host:
//! - [`locator`]: canonical/staging paths, change detection, atomic staging copy
//! - [`proxy`]: discovers and drives the layers of one loaded module
//! - [`domain`]: isolated, destructible container hosting one loader proxy
//! - [`entry`]: the Cold and HotSwap strategies the host calls every tick
//!
//! Everything runs synchronously on the host's update thread.

pub mod config;
pub mod domain;
pub mod entry;
pub mod error;
pub mod locator;
pub mod logging;
pub mod proxy;

pub use config::{FingerprintMode, LocatorConfig, LogConfig, StrategyKind, SwapConfig};
pub use domain::{DomainId, DomainSetup, ModuleBackend, ModuleDomain, ModuleImage, NativeBackend};
pub use entry::{ColdEntry, Entry, EntryState, EntryStats, HotSwapEntry, build_entry};
pub use error::{
    DomainTeardownError, Hook, HookFailure, LayerHookError, LoadError, LocatorError, ReloadError,
};
pub use locator::{Fingerprint, ModuleLocator, library_file_name};
pub use proxy::{HookReport, LoaderProxy};

pub use tickswap_kernel::{Layer, LayerError, LayerRegistration, LayerResult};
