//! Tickswap Kernel
//!
//! The contract shared by a host and the modules it loads:
//! - [`Layer`]: the behavior unit with `attach` / `update` / `detach` hooks
//! - [`LayerRegistration`]: how a module advertises the layer types it contains
//! - [`abi`]: the exported symbols a module must provide, and [`declare_layers!`] to emit them
//! - [`guard`]: panic containment compiled into the module
//!
//! A module author only depends on this crate.

pub mod abi;
pub mod error;
pub mod guard;
pub mod layer;

pub use abi::{
    API_VERSION_SYMBOL, ApiVersionFn, DEPENDENCIES_SYMBOL, DependenciesFn, LAYER_API_VERSION,
    LAYER_TABLE_SYMBOL, LayerTableFn,
};
pub use error::{LayerError, LayerResult};
pub use guard::{catch_panic, panic_message};
pub use layer::{Layer, LayerConstructor, LayerRegistration, short_type_name};
