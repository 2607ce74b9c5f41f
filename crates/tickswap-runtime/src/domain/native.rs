//! Shared-library backend
//!
//! Opens a staged module with `libloading`, checks its API version, resolves
//! companion modules and reads its layer table.
//!
//! A module that references symbols it does not link against fails to open.
//! The companions named in [`DomainSetup::companions`] are then opened with
//! global symbol visibility and the module is opened again.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tickswap_kernel::{
    API_VERSION_SYMBOL, ApiVersionFn, DEPENDENCIES_SYMBOL, DependenciesFn, LAYER_API_VERSION,
    LAYER_TABLE_SYMBOL, LayerRegistration, LayerTableFn,
};
use tracing::{debug, info, warn};

use super::{DomainSetup, ModuleBackend, ModuleImage};
use crate::error::{DomainTeardownError, LoadError};
use crate::locator::library_file_name;

/// Loads modules as shared libraries
#[derive(Debug, Clone)]
pub struct NativeBackend {
    api_version: u32,
}

impl NativeBackend {
    /// Create a backend expecting the current [`LAYER_API_VERSION`]
    pub fn new() -> Self {
        Self {
            api_version: LAYER_API_VERSION,
        }
    }

    /// Expected API version
    pub fn api_version(&self) -> u32 {
        self.api_version
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleBackend for NativeBackend {
    fn open(&self, path: &Path, setup: &DomainSetup) -> Result<Box<dyn ModuleImage>, LoadError> {
        info!("Loading module library: {:?}", path);

        let mut companions: Vec<(String, Library)> = Vec::new();

        // SAFETY: running a module's initializers is the point of loading it;
        // the module is trusted to uphold the kernel ABI.
        let library = match unsafe { Library::new(path) } {
            Ok(library) => library,
            Err(e) if !setup.companions.is_empty() => {
                debug!("Opening {:?} failed ({}); preloading companions", path, e);
                preload_companions(&setup.companions, setup, &mut companions);
                // SAFETY: as above.
                unsafe { Library::new(path) }.map_err(|e| LoadError::Library {
                    path: path.to_path_buf(),
                    message: format!(
                        "{} (companions loaded: {:?})",
                        e,
                        companion_names(&companions)
                    ),
                })?
            }
            Err(e) => {
                return Err(LoadError::Library {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };

        // SAFETY: symbol type matches `declare_layers!`.
        let api_version = unsafe {
            let version_fn: Symbol<ApiVersionFn> = library.get(API_VERSION_SYMBOL).map_err(|e| {
                LoadError::SymbolNotFound(format!("_tickswap_api_version: {}", e))
            })?;
            version_fn()
        };

        if api_version != self.api_version {
            return Err(LoadError::VersionMismatch {
                expected: self.api_version,
                actual: api_version,
            });
        }

        let declared = declared_companions(&library);
        preload_companions(&declared, setup, &mut companions);

        Ok(Box::new(NativeImage {
            path: path.to_path_buf(),
            library: Some(library),
            companions,
        }))
    }
}

/// Names a module declares through `declare_layers!(depends_on = [..])`
fn declared_companions(library: &Library) -> Vec<String> {
    // SAFETY: symbol type matches `declare_layers!`; the names are copied out
    // before the library can be closed.
    unsafe {
        match library.get::<DependenciesFn>(DEPENDENCIES_SYMBOL) {
            Ok(deps_fn) => deps_fn().iter().map(|s| s.to_string()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Load each named companion not loaded yet, best effort.
fn preload_companions(
    names: &[String],
    setup: &DomainSetup,
    companions: &mut Vec<(String, Library)>,
) {
    for name in names {
        if companions.iter().any(|(loaded, _)| loaded == name) {
            continue;
        }
        match load_companion(name, setup) {
            Some(companion) => companions.push((name.clone(), companion)),
            None => warn!("Cannot load companion module {}; continuing without it", name),
        }
    }
}

fn companion_names(companions: &[(String, Library)]) -> Vec<&str> {
    companions.iter().map(|(name, _)| name.as_str()).collect()
}

fn load_companion(name: &str, setup: &DomainSetup) -> Option<Library> {
    let file_name = library_file_name(name);

    for dir in &setup.search_dirs {
        let candidate = dir.join(&file_name);
        if !candidate.is_file() {
            continue;
        }
        // SAFETY: see `NativeBackend::open`.
        match unsafe { open_global(&candidate) } {
            Ok(library) => {
                debug!("Loaded companion {} from {:?}", name, candidate);
                return Some(library);
            }
            Err(e) => debug!("Companion candidate {:?} rejected: {}", candidate, e),
        }
    }

    if setup.outside_search {
        // SAFETY: see `NativeBackend::open`.
        match unsafe { open_global(&file_name) } {
            Ok(library) => {
                debug!("Loaded companion {} through the system search path", name);
                return Some(library);
            }
            Err(e) => debug!("System loader cannot find {}: {}", file_name, e),
        }
    }

    None
}

/// Open a library whose symbols can satisfy modules opened after it.
#[cfg(unix)]
unsafe fn open_global<P: AsRef<OsStr>>(path: P) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    // SAFETY: forwarded to the caller.
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }.map(Library::from)
}

/// Open a library whose symbols can satisfy modules opened after it.
#[cfg(not(unix))]
unsafe fn open_global<P: AsRef<OsStr>>(path: P) -> Result<Library, libloading::Error> {
    // SAFETY: forwarded to the caller.
    unsafe { Library::new(path) }
}

struct NativeImage {
    path: PathBuf,
    // Dropped before the companions it may depend on.
    library: Option<Library>,
    companions: Vec<(String, Library)>,
}

impl ModuleImage for NativeImage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn layer_table(&self) -> Result<Vec<LayerRegistration>, LoadError> {
        let library = self.library.as_ref().ok_or_else(|| LoadError::Malformed {
            path: self.path.clone(),
            reason: "library already closed".to_string(),
        })?;

        // SAFETY: symbol type matches `declare_layers!`.
        let table_fn: Symbol<LayerTableFn> = unsafe {
            library.get(LAYER_TABLE_SYMBOL).map_err(|e| {
                LoadError::SymbolNotFound(format!("_tickswap_layer_table: {}", e))
            })?
        };

        // SAFETY: as above. The exported function catches its own panics.
        unsafe { table_fn() }.map_err(|e| LoadError::Malformed {
            path: self.path.clone(),
            reason: format!("layer table failed: {}", e),
        })
    }

    fn close(mut self: Box<Self>) -> Result<(), DomainTeardownError> {
        let mut result = Ok(());

        if let Some(library) = self.library.take() {
            if let Err(e) = library.close() {
                result = Err(DomainTeardownError::Close {
                    path: self.path.clone(),
                    message: e.to_string(),
                });
            }
        }

        while let Some((name, companion)) = self.companions.pop() {
            if let Err(e) = companion.close() {
                warn!("Failed to close companion module {}: {}", name, e);
            }
        }

        debug!("Unloaded module library: {:?}", self.path);
        result
    }
}
