//! Module domains
//!
//! A [`ModuleDomain`] is the unit of isolation: it owns the opened module image
//! and the single [`LoaderProxy`] built from it, and tears both down in one
//! [`destroy`](ModuleDomain::destroy) call. The host talks to the layers only
//! through the domain's delegating methods.
//!
//! Opening the module file is delegated to a [`ModuleBackend`]; the production
//! backend is [`NativeBackend`], which loads shared libraries.

mod native;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tickswap_kernel::LayerRegistration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DomainTeardownError, LoadError};
use crate::proxy::{HookReport, LoaderProxy};

pub use native::NativeBackend;

/// Identity of one domain instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainId(Uuid);

impl DomainId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters for a new domain
#[derive(Debug, Clone, Default)]
pub struct DomainSetup {
    /// Friendly name used in logs
    pub name: String,
    /// Base directory of the module
    pub base_dir: PathBuf,
    /// Directories searched for companion modules
    pub search_dirs: Vec<PathBuf>,
    /// Let companions resolve through the platform loader's own search path
    pub outside_search: bool,
    /// Companion modules preloaded when the module cannot be opened on its own
    pub companions: Vec<String>,
}

impl DomainSetup {
    /// Create a setup rooted at `base_dir`
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            name: name.into(),
            search_dirs: vec![base_dir.clone()],
            base_dir,
            outside_search: false,
            companions: Vec::new(),
        }
    }

    /// Add a companion search directory
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !self.search_dirs.contains(&dir) {
            self.search_dirs.push(dir);
        }
        self
    }

    /// Name a companion module, without platform prefix or extension
    pub fn with_companion(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.companions.contains(&name) {
            self.companions.push(name);
        }
        self
    }

    /// Enable/disable outside search for companions
    pub fn with_outside_search(mut self, enabled: bool) -> Self {
        self.outside_search = enabled;
        self
    }
}

/// Platform facility that opens a module file
pub trait ModuleBackend {
    /// Open the module at `path` for a domain configured by `setup`.
    fn open(&self, path: &Path, setup: &DomainSetup) -> Result<Box<dyn ModuleImage>, LoadError>;
}

/// An opened module
pub trait ModuleImage {
    /// File the image was opened from
    fn path(&self) -> &Path;

    /// Enumerate the Layer-capable types the module exports, in discovery order.
    fn layer_table(&self) -> Result<Vec<LayerRegistration>, LoadError>;

    /// Release the image. Every layer built from it must already be dropped.
    fn close(self: Box<Self>) -> Result<(), DomainTeardownError>;
}

/// Isolated container hosting exactly one loaded module
pub struct ModuleDomain {
    id: DomainId,
    setup: DomainSetup,
    // Field order matters for the fallback `Drop`: layers go before the image.
    proxy: Option<LoaderProxy>,
    image: Option<Box<dyn ModuleImage>>,
    created_at: Instant,
    torn_down: bool,
}

impl ModuleDomain {
    /// Allocate a fresh, empty domain
    pub fn create(setup: DomainSetup) -> Self {
        let id = DomainId::new();
        info!("New domain created: {} ({})", setup.name, id);
        Self {
            id,
            setup,
            proxy: None,
            image: None,
            created_at: Instant::now(),
            torn_down: false,
        }
    }

    /// Get the domain ID
    pub fn id(&self) -> DomainId {
        self.id
    }

    /// Get the setup the domain was created with
    pub fn setup(&self) -> &DomainSetup {
        &self.setup
    }

    /// Get when the domain was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Whether a loader proxy is hosted
    pub fn is_loaded(&self) -> bool {
        self.proxy.is_some()
    }

    /// Open `path` and instantiate its layers into this domain's loader proxy.
    ///
    /// A domain hosts one proxy; a second call fails with [`LoadError::AlreadyLoaded`].
    /// On failure the domain holds no layers and must still be destroyed.
    pub fn load_from(&mut self, backend: &dyn ModuleBackend, path: &Path) -> Result<(), LoadError> {
        if self.proxy.is_some() || self.image.is_some() {
            return Err(LoadError::AlreadyLoaded);
        }
        if !path.is_file() {
            return Err(LoadError::MissingModuleFile(path.to_path_buf()));
        }

        debug!("Domain {} loading {:?}", self.id, path);
        let image = backend.open(path, &self.setup)?;
        let table = image.layer_table();
        self.image = Some(image);

        let proxy = LoaderProxy::instantiate(path, table?)?;
        self.proxy = Some(proxy);
        Ok(())
    }

    /// Attach every hosted layer; `None` if nothing is loaded
    pub fn attach_layers(&mut self) -> Option<HookReport> {
        self.proxy.as_mut().map(LoaderProxy::attach_layers)
    }

    /// Update every hosted layer; `None` if nothing is loaded
    pub fn update_layers(&mut self) -> Option<HookReport> {
        self.proxy.as_mut().map(LoaderProxy::update_layers)
    }

    /// Detach every hosted layer; `None` if nothing is loaded
    pub fn detach_layers(&mut self) -> Option<HookReport> {
        self.proxy.as_mut().map(LoaderProxy::detach_layers)
    }

    /// Display names of the hosted layers
    pub fn layer_names(&self) -> Vec<String> {
        self.proxy
            .as_ref()
            .map(LoaderProxy::layer_names)
            .unwrap_or_default()
    }

    /// Release the domain and everything loaded into it.
    ///
    /// Valid whether or not a load succeeded. Layers are dropped before the
    /// module image is closed.
    pub fn destroy(mut self) -> Result<(), DomainTeardownError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), DomainTeardownError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        drop(self.proxy.take());
        let result = match self.image.take() {
            Some(image) => image.close(),
            None => Ok(()),
        };
        debug!(
            "Domain {} unloaded after {:?}",
            self.id,
            self.created_at.elapsed()
        );
        result
    }
}

impl Drop for ModuleDomain {
    fn drop(&mut self) {
        if !self.torn_down {
            warn!("Domain {} dropped without destroy", self.id);
            if let Err(e) = self.teardown() {
                warn!("Domain {} teardown failed: {}", self.id, e);
            }
        }
    }
}

impl fmt::Debug for ModuleDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDomain")
            .field("id", &self.id)
            .field("name", &self.setup.name)
            .field("layers", &self.layer_names())
            .finish()
    }
}
