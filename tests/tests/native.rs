//! Entry strategies and domains over real shared libraries.
//!
//! The modules come from `tests/modules/` and are built on first use.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tickswap_kernel::LAYER_API_VERSION;
use tickswap_runtime::{
    DomainSetup, EntryState, LoadError, ModuleDomain, NativeBackend, StrategyKind,
    library_file_name,
};
use tickswap_testing::native::{FIXTURE_COMPANION_LIB, fixture_companion, fixture_layers};
use tickswap_testing::{MemoryBackend, ModuleFixture, assert_layers, tick};

fn native_fixture() -> ModuleFixture {
    ModuleFixture::new(MemoryBackend::new()).unwrap()
}

/// Copy `library` into `dir` under the platform file name for `name`.
fn place(library: &Path, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(library_file_name(name));
    std::fs::copy(library, &path).unwrap();
    path
}

#[test]
fn test_native_hotswap_load_swap_detach() {
    let steady = fixture_layers(&[]).unwrap();
    let panicky = fixture_layers(&["panicky"]).unwrap();
    let fixture = native_fixture();
    fixture.install(&steady).unwrap();

    let mut entry = fixture.native_entry(fixture.config(StrategyKind::HotSwap, 1));
    entry.attach();
    tick(entry.as_mut(), 1);
    assert_eq!(entry.state(), EntryState::Attached);
    assert_layers!(entry, ["Steady", "Counter"]);
    let first = entry.domain_id();

    // The swap happens on this tick; `Boom` panics in the same tick's update.
    fixture.install(&panicky).unwrap();
    tick(entry.as_mut(), 1);
    assert_eq!(entry.state(), EntryState::Attached);
    assert_layers!(entry, ["Steady", "Boom"]);
    assert_ne!(entry.domain_id(), first);

    tick(entry.as_mut(), 5);
    assert_eq!(entry.state(), EntryState::Attached);

    let stats = entry.stats();
    assert_eq!(stats.loads, 2);
    assert_eq!(stats.teardowns, 1);
    assert_eq!(stats.load_failures, 0);

    entry.detach();
    assert_eq!(entry.state(), EntryState::Unloaded);
    assert_layers!(entry, []);
    assert_eq!(entry.stats().teardowns, 2);
}

#[test]
fn test_native_panic_faults_only_that_layer() {
    let dir = TempDir::new().unwrap();
    let path = place(&fixture_layers(&["panicky"]).unwrap(), dir.path(), "panicky");

    let mut domain = ModuleDomain::create(DomainSetup::new("native", dir.path()));
    domain.load_from(&NativeBackend::new(), &path).unwrap();
    assert_eq!(domain.layer_names(), ["Steady", "Boom"]);
    assert!(domain.attach_layers().unwrap().is_clean());

    let report = domain.update_layers().unwrap();
    assert_eq!(report.invoked, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].layer, "Boom");
    assert!(report.failures[0].is_panic());
    assert!(report.failures[0].to_string().contains("Boom::update exploded"));

    let report = domain.update_layers().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.invoked, 1);
    assert_eq!(report.skipped, 1);

    let report = domain.detach_layers().unwrap();
    assert_eq!(report.skipped, 1);
    domain.destroy().unwrap();
}

#[test]
fn test_native_version_mismatch_is_rejected() {
    let skewed = fixture_layers(&["skewed"]).unwrap();
    let dir = TempDir::new().unwrap();
    let path = place(&skewed, dir.path(), "skewed");

    let mut domain = ModuleDomain::create(DomainSetup::new("native", dir.path()));
    let err = domain.load_from(&NativeBackend::new(), &path).unwrap_err();
    assert!(
        matches!(
            err,
            LoadError::VersionMismatch { expected, actual }
                if expected == LAYER_API_VERSION && actual == LAYER_API_VERSION + 100
        ),
        "{err}"
    );
    assert!(!domain.is_loaded());
    domain.destroy().unwrap();

    let fixture = native_fixture();
    fixture.install(&skewed).unwrap();
    let mut entry = fixture.native_entry(fixture.config(StrategyKind::HotSwap, 0));
    entry.attach();
    assert_eq!(entry.state(), EntryState::Unloaded);
    assert_eq!(entry.stats().load_failures, 1);
    entry.detach();
}

#[cfg(target_os = "linux")]
#[test]
fn test_companion_preloaded_after_failed_open() {
    let dependent = fixture_layers(&["dependent"]).unwrap();
    let companion = fixture_companion().unwrap();
    let dir = TempDir::new().unwrap();
    let path = place(&dependent, dir.path(), "dependent");

    // Nothing named: the unresolved reference fails the open.
    let mut domain = ModuleDomain::create(DomainSetup::new("native", dir.path()));
    let err = domain.load_from(&NativeBackend::new(), &path).unwrap_err();
    assert!(
        matches!(&err, LoadError::Library { message, .. } if message.contains("tickswap_companion_value")),
        "{err}"
    );
    domain.destroy().unwrap();

    place(&companion, dir.path(), FIXTURE_COMPANION_LIB);
    let setup = DomainSetup::new("native", dir.path()).with_companion(FIXTURE_COMPANION_LIB);
    let mut domain = ModuleDomain::create(setup);
    domain.load_from(&NativeBackend::new(), &path).unwrap();
    assert_eq!(domain.layer_names(), ["Steady", "Counter", "Linked"]);
    assert!(domain.attach_layers().unwrap().is_clean());
    domain.detach_layers();
    domain.destroy().unwrap();

    // Same fallback through configuration.
    let fixture = native_fixture();
    fixture.install(&dependent).unwrap();
    place(&companion, fixture.root(), FIXTURE_COMPANION_LIB);
    let mut config = fixture.config(StrategyKind::HotSwap, 0);
    config.locator = config.locator.with_companion(FIXTURE_COMPANION_LIB);

    let mut entry = fixture.native_entry(config);
    entry.attach();
    assert_eq!(entry.state(), EntryState::Attached);
    assert_layers!(entry, ["Steady", "Counter", "Linked"]);
    entry.detach();
}
