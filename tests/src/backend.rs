use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tickswap_kernel::{Layer, LayerError, LayerRegistration, LayerResult};
use tickswap_runtime::{DomainSetup, DomainTeardownError, LoadError, ModuleBackend, ModuleImage};

use crate::journal::{Event, Journal};

/// Where a test layer misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The constructor returns an error
    Instantiate,
    /// `attach` returns an error
    Attach,
    /// `update` returns an error
    Update,
    /// `detach` returns an error
    Detach,
    /// `update` panics
    PanicOnUpdate,
}

/// One layer type of an in-memory build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSpec {
    pub name: &'static str,
    pub fault: Option<Fault>,
}

impl LayerSpec {
    pub fn new(name: &'static str) -> Self {
        Self { name, fault: None }
    }

    pub fn failing(name: &'static str, fault: Fault) -> Self {
        Self {
            name,
            fault: Some(fault),
        }
    }
}

#[derive(Default)]
struct Registry {
    builds: HashMap<String, Vec<LayerSpec>>,
    setups: Vec<DomainSetup>,
}

/// A [`ModuleBackend`] whose modules are declared in memory.
///
/// The staged file's trimmed content selects the build; unknown content is a
/// malformed module. Clones share builds and journal, so a test keeps one
/// handle while the entry owns another.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    registry: Arc<Mutex<Registry>>,
    journal: Journal,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a build; the layer order is the discovery order
    pub fn with_build(self, key: &str, layers: impl IntoIterator<Item = LayerSpec>) -> Self {
        self.add_build(key, layers);
        self
    }

    pub fn add_build(&self, key: &str, layers: impl IntoIterator<Item = LayerSpec>) {
        self.registry
            .lock()
            .builds
            .insert(key.to_string(), layers.into_iter().collect());
    }

    /// The journal shared by every layer this backend builds
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Setup of the most recently opened domain
    pub fn last_setup(&self) -> Option<DomainSetup> {
        self.registry.lock().setups.last().cloned()
    }
}

impl ModuleBackend for MemoryBackend {
    fn open(&self, path: &Path, setup: &DomainSetup) -> Result<Box<dyn ModuleImage>, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Library {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let build = content.trim().to_string();

        let mut registry = self.registry.lock();
        registry.setups.push(setup.clone());
        let layers = registry
            .builds
            .get(&build)
            .cloned()
            .ok_or_else(|| LoadError::Malformed {
                path: path.to_path_buf(),
                reason: format!("unknown build {build:?}"),
            })?;
        drop(registry);

        self.journal.record(Event::Opened {
            build: build.clone(),
        });
        Ok(Box::new(MemoryImage {
            path: path.to_path_buf(),
            build,
            layers,
            journal: self.journal.clone(),
        }))
    }
}

struct MemoryImage {
    path: PathBuf,
    build: String,
    layers: Vec<LayerSpec>,
    journal: Journal,
}

impl ModuleImage for MemoryImage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn layer_table(&self) -> Result<Vec<LayerRegistration>, LoadError> {
        Ok(self
            .layers
            .iter()
            .map(|spec| {
                let spec = *spec;
                let build = self.build.clone();
                let journal = self.journal.clone();
                LayerRegistration::named(spec.name, move || {
                    JournalLayer::create(spec, build.clone(), journal.clone())
                })
            })
            .collect())
    }

    fn close(self: Box<Self>) -> Result<(), DomainTeardownError> {
        let MemoryImage { build, journal, .. } = *self;
        journal.record(Event::Closed { build });
        Ok(())
    }
}

/// Test layer that writes every hook and its drop to the journal
struct JournalLayer {
    spec: LayerSpec,
    build: String,
    journal: Journal,
}

impl JournalLayer {
    fn create(spec: LayerSpec, build: String, journal: Journal) -> LayerResult<Box<dyn Layer>> {
        if spec.fault == Some(Fault::Instantiate) {
            return Err(LayerError::failed(format!("{} refuses to start", spec.name)));
        }
        journal.record(Event::Created {
            build: build.clone(),
            layer: spec.name,
        });
        Ok(Box::new(Self {
            spec,
            build,
            journal,
        }))
    }

    fn fails(&self, fault: Fault) -> LayerResult<()> {
        if self.spec.fault == Some(fault) {
            Err(LayerError::failed(format!("{} failed on purpose", self.spec.name)))
        } else {
            Ok(())
        }
    }
}

impl Layer for JournalLayer {
    fn attach(&mut self) -> LayerResult<()> {
        self.journal.record(Event::Attached {
            build: self.build.clone(),
            layer: self.spec.name,
        });
        self.fails(Fault::Attach)
    }

    fn update(&mut self) -> LayerResult<()> {
        self.journal.record(Event::Updated {
            build: self.build.clone(),
            layer: self.spec.name,
        });
        if self.spec.fault == Some(Fault::PanicOnUpdate) {
            panic!("{} panicked in update", self.spec.name);
        }
        self.fails(Fault::Update)
    }

    fn detach(&mut self) -> LayerResult<()> {
        self.journal.record(Event::Detached {
            build: self.build.clone(),
            layer: self.spec.name,
        });
        self.fails(Fault::Detach)
    }
}

impl Drop for JournalLayer {
    fn drop(&mut self) {
        self.journal.record(Event::Dropped {
            build: self.build.clone(),
            layer: self.spec.name,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_build_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module");
        std::fs::write(&path, "nope\n").unwrap();

        let backend = MemoryBackend::new().with_build("v1", [LayerSpec::new("Alpha")]);
        let result = backend.open(&path, &DomainSetup::new("test", dir.path()));
        assert!(matches!(result, Err(LoadError::Malformed { .. })));
        assert_eq!(backend.journal().opens(), 0);
        assert!(backend.last_setup().is_some());
    }

    #[test]
    fn test_image_builds_journaled_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module");
        std::fs::write(&path, "v1").unwrap();

        let backend = MemoryBackend::new().with_build(
            "v1",
            [LayerSpec::new("Alpha"), LayerSpec::failing("Beta", Fault::Instantiate)],
        );
        let image = backend
            .open(&path, &DomainSetup::new("test", dir.path()))
            .unwrap();
        let table = image.layer_table().unwrap();
        assert_eq!(table[0].type_name(), "Alpha");

        let mut alpha = table[0].instantiate().unwrap();
        alpha.attach().unwrap();
        assert!(table[1].instantiate().is_err());
        drop(alpha);
        image.close().unwrap();

        let journal = backend.journal();
        assert_eq!(journal.live_layers(), 0);
        assert_eq!(journal.events().last(), Some(&Event::Closed { build: "v1".into() }));
    }
}
