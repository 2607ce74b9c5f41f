//! Layer trait and discovery records

use std::fmt;

use crate::error::LayerResult;
use crate::guard::{Guarded, catch_panic};

/// A behavior unit driven by the host once per lifecycle event.
///
/// Any state a layer needs is owned by the layer instance and is dropped with
/// the module domain that produced it. `update` runs on the host's tick thread
/// and must not block.
pub trait Layer {
    /// Called once after every layer of the module was instantiated.
    fn attach(&mut self) -> LayerResult<()> {
        Ok(())
    }

    /// Called once per host tick.
    fn update(&mut self) -> LayerResult<()> {
        Ok(())
    }

    /// Called once before the module is torn down.
    fn detach(&mut self) -> LayerResult<()> {
        Ok(())
    }
}

/// Constructor stored in a [`LayerRegistration`].
pub type LayerConstructor = Box<dyn Fn() -> LayerResult<Box<dyn Layer>>>;

/// One Layer-capable type exported by a module.
///
/// The layer table returned by a module is a `Vec` of these, in discovery order.
/// Every constructor and every layer it builds is guarded: a panic in module
/// code comes back as [`LayerError::Panicked`](crate::LayerError::Panicked).
pub struct LayerRegistration {
    type_name: &'static str,
    constructor: LayerConstructor,
}

impl LayerRegistration {
    /// Register a layer type that is built with [`Default`].
    pub fn of<T>() -> Self
    where
        T: Layer + Default + 'static,
    {
        Self::with_constructor::<T, _>(|| Ok(T::default()))
    }

    /// Register a layer type with a fallible constructor.
    pub fn with_constructor<T, F>(constructor: F) -> Self
    where
        T: Layer + 'static,
        F: Fn() -> LayerResult<T> + 'static,
    {
        let type_name = short_type_name(std::any::type_name::<T>());
        Self {
            type_name,
            constructor: Box::new(move || {
                let layer = catch_panic(|| constructor())?;
                Ok(Guarded::wrap(type_name, Box::new(layer)))
            }),
        }
    }

    /// Register a layer under an explicit display name.
    pub fn named<F>(type_name: &'static str, constructor: F) -> Self
    where
        F: Fn() -> LayerResult<Box<dyn Layer>> + 'static,
    {
        Self {
            type_name,
            constructor: Box::new(move || {
                let layer = catch_panic(|| constructor())?;
                Ok(Guarded::wrap(type_name, layer))
            }),
        }
    }

    /// Display name of the concrete layer type.
    ///
    /// The string may live in the module image; copy it before the module is closed.
    pub fn type_name(&self) -> &str {
        self.type_name
    }

    /// Build one instance of the layer.
    pub fn instantiate(&self) -> LayerResult<Box<dyn Layer>> {
        (self.constructor)()
    }
}

impl fmt::Debug for LayerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerRegistration")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Strip module paths and generic arguments from a type name.
///
/// `my_mod::physics::Gravity<f32>` becomes `Gravity`.
pub fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
