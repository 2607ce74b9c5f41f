//! Loader proxy
//!
//! Lives inside a [`ModuleDomain`](crate::domain::ModuleDomain) and drives every
//! layer of the loaded module as one batch. Layers are kept in discovery order;
//! the collection is built once per load and only shrinks when it is detached
//! or dropped with its domain.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use tickswap_kernel::{Layer, LayerRegistration};
use tracing::{debug, error, info, warn};

use crate::error::{DomainTeardownError, Hook, HookFailure, LayerHookError, LoadError, panic_message};

/// Outcome of running one hook over the whole batch
#[derive(Debug)]
pub struct HookReport {
    /// Hook that ran
    pub hook: Hook,
    /// Layers whose hook was invoked
    pub invoked: usize,
    /// Faulted layers that were skipped
    pub skipped: usize,
    /// Failures, in invocation order
    pub failures: Vec<LayerHookError>,
}

impl HookReport {
    fn new(hook: Hook) -> Self {
        Self {
            hook,
            invoked: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    /// No layer failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct HeldLayer {
    name: String,
    layer: Box<dyn Layer>,
    faulted: bool,
}

impl HeldLayer {
    fn run(&mut self, hook: Hook) -> Result<(), LayerHookError> {
        let layer = &mut self.layer;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match hook {
            Hook::Attach => layer.attach(),
            Hook::Update => layer.update(),
            Hook::Detach => layer.detach(),
        }));

        let failure = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => HookFailure::from_layer(e),
            Err(payload) => HookFailure::Panicked(panic_message(payload.as_ref())),
        };

        Err(LayerHookError {
            layer: self.name.clone(),
            hook,
            failure,
        })
    }
}

/// Drop a layer, containing a panic in its destructor.
fn release(held: HeldLayer) -> Result<(), DomainTeardownError> {
    let HeldLayer { name, layer, .. } = held;
    panic::catch_unwind(AssertUnwindSafe(move || drop(layer)))
        .map_err(|_| DomainTeardownError::DropPanicked { layer: name })
}

/// Drop layers in reverse discovery order.
fn release_all(layers: &mut Vec<HeldLayer>) -> Vec<DomainTeardownError> {
    let mut errors = Vec::new();
    while let Some(held) = layers.pop() {
        if let Err(e) = release(held) {
            errors.push(e);
        }
    }
    errors
}

/// Discovers and drives the layers of one module
pub struct LoaderProxy {
    source: PathBuf,
    layers: Vec<HeldLayer>,
    attached: bool,
}

impl LoaderProxy {
    /// Instantiate one layer per registration, in table order.
    ///
    /// All or nothing: if any constructor fails or panics, every layer built so
    /// far is dropped and the whole module is rejected.
    pub fn instantiate(
        source: impl Into<PathBuf>,
        table: Vec<LayerRegistration>,
    ) -> Result<Self, LoadError> {
        let source = source.into();
        let mut layers = Vec::with_capacity(table.len());

        for (index, registration) in table.iter().enumerate() {
            let name = registration.type_name().to_string();
            let built = panic::catch_unwind(AssertUnwindSafe(|| registration.instantiate()));

            let reason = match built {
                Ok(Ok(layer)) => {
                    layers.push(HeldLayer {
                        name,
                        layer,
                        faulted: false,
                    });
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };

            error!(
                "Discarding {} instantiated layer(s) from {:?}: {} failed",
                layers.len(),
                source,
                name
            );
            for e in release_all(&mut layers) {
                warn!("{}", e);
            }
            return Err(LoadError::Instantiation {
                layer: name,
                index,
                reason,
            });
        }

        info!("Loaded {} layer(s) from {:?}", layers.len(), source);
        Ok(Self {
            source,
            layers,
            attached: false,
        })
    }

    /// Path the layers were loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Number of held layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if no layers are held
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Number of layers skipped by further hooks
    pub fn faulted_count(&self) -> usize {
        self.layers.iter().filter(|held| held.faulted).count()
    }

    /// Display names of the held layers, in discovery order
    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|held| held.name.clone()).collect()
    }

    /// Run `attach` on every layer in discovery order.
    ///
    /// A layer that fails to attach is skipped by every later hook of this load.
    pub fn attach_layers(&mut self) -> HookReport {
        let mut report = HookReport::new(Hook::Attach);
        if self.attached {
            warn!("Layers from {:?} are already attached", self.source);
            return report;
        }

        for held in &mut self.layers {
            report.invoked += 1;
            if let Err(e) = held.run(Hook::Attach) {
                error!("{}; layer disabled", e);
                held.faulted = true;
                report.failures.push(e);
            }
        }
        self.attached = true;
        report
    }

    /// Run `update` on every active layer in discovery order.
    ///
    /// A returned error is logged and the layer keeps running; a panic faults it.
    pub fn update_layers(&mut self) -> HookReport {
        let mut report = HookReport::new(Hook::Update);
        for held in &mut self.layers {
            if held.faulted {
                report.skipped += 1;
                continue;
            }
            report.invoked += 1;
            if let Err(e) = held.run(Hook::Update) {
                if e.is_panic() {
                    error!("{}; layer disabled", e);
                    held.faulted = true;
                } else {
                    warn!("{}", e);
                }
                report.failures.push(e);
            }
        }
        report
    }

    /// Run `detach` on every active layer in reverse discovery order, then drop
    /// all layers.
    pub fn detach_layers(&mut self) -> HookReport {
        let mut report = HookReport::new(Hook::Detach);
        for held in self.layers.iter_mut().rev() {
            if held.faulted {
                report.skipped += 1;
                continue;
            }
            report.invoked += 1;
            if let Err(e) = held.run(Hook::Detach) {
                warn!("{}", e);
                report.failures.push(e);
            }
        }

        for e in release_all(&mut self.layers) {
            warn!("{}", e);
        }
        self.attached = false;
        debug!("Detached layers from {:?}", self.source);
        report
    }
}

impl Drop for LoaderProxy {
    fn drop(&mut self) {
        for e in release_all(&mut self.layers) {
            warn!("{}", e);
        }
    }
}

impl std::fmt::Debug for LoaderProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderProxy")
            .field("source", &self.source)
            .field("layers", &self.layer_names())
            .field("attached", &self.attached)
            .finish()
    }
}
