//! Module export ABI
//!
//! A loadable module is a shared library that exports three symbols:
//!
//! | Symbol | Signature | Required |
//! |---|---|---|
//! | `_tickswap_api_version` | [`ApiVersionFn`] | yes |
//! | `_tickswap_layer_table` | [`LayerTableFn`] | yes |
//! | `_tickswap_dependencies` | [`DependenciesFn`] | no |
//!
//! The layer table crosses the boundary with the Rust ABI, so host and module
//! must be built by the same compiler against the same `tickswap-kernel`.
//! [`LAYER_API_VERSION`] guards the struct layouts.
//!
//! No panic unwinds across the boundary. The table function and every
//! registration it returns catch panics inside the module and report them
//! as [`LayerError::Panicked`](crate::LayerError::Panicked).

use crate::error::LayerResult;
use crate::layer::LayerRegistration;

/// Version of the layer table contract.
pub const LAYER_API_VERSION: u32 = 2;

/// Symbol returning the module's [`LAYER_API_VERSION`].
pub const API_VERSION_SYMBOL: &[u8] = b"_tickswap_api_version";

/// Symbol returning the layer table.
pub const LAYER_TABLE_SYMBOL: &[u8] = b"_tickswap_layer_table";

/// Symbol returning the names of companion modules.
pub const DEPENDENCIES_SYMBOL: &[u8] = b"_tickswap_dependencies";

/// Signature of `_tickswap_api_version`.
pub type ApiVersionFn = unsafe extern "C" fn() -> u32;

/// Signature of `_tickswap_layer_table`.
pub type LayerTableFn = unsafe fn() -> LayerResult<Vec<LayerRegistration>>;

/// Signature of `_tickswap_dependencies`.
pub type DependenciesFn = unsafe fn() -> &'static [&'static str];

/// Export the layer table of a module.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Gravity;
/// impl tickswap_kernel::Layer for Gravity {}
///
/// #[derive(Default)]
/// struct Wind;
/// impl tickswap_kernel::Layer for Wind {}
///
/// tickswap_kernel::declare_layers!(Gravity, Wind);
/// ```
///
/// Layers with fallible constructors can supply their own table function:
///
/// ```rust,ignore
/// fn table() -> Vec<tickswap_kernel::LayerRegistration> { /* ... */ }
/// tickswap_kernel::declare_layers!(table = table);
/// ```
///
/// Companion modules resolved before the table is read:
///
/// ```rust,ignore
/// tickswap_kernel::declare_layers!(depends_on = ["physics_core"]; Gravity, Wind);
/// ```
#[macro_export]
macro_rules! declare_layers {
    (@exports [$($dep:expr),*] $table:expr) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _tickswap_api_version() -> u32 {
            $crate::LAYER_API_VERSION
        }

        #[unsafe(no_mangle)]
        pub fn _tickswap_layer_table()
        -> $crate::LayerResult<::std::vec::Vec<$crate::LayerRegistration>> {
            $crate::catch_panic(|| ::std::result::Result::Ok($table))
        }

        #[unsafe(no_mangle)]
        pub fn _tickswap_dependencies() -> &'static [&'static str] {
            &[$($dep),*]
        }
    };
    (depends_on = [$($dep:expr),* $(,)?]; table = $table:path) => {
        $crate::declare_layers!(@exports [$($dep),*] $table());
    };
    (table = $table:path) => {
        $crate::declare_layers!(@exports [] $table());
    };
    (depends_on = [$($dep:expr),* $(,)?]; $($layer:ty),* $(,)?) => {
        $crate::declare_layers!(
            @exports [$($dep),*]
            ::std::vec![$($crate::LayerRegistration::of::<$layer>()),*]
        );
    };
    ($($layer:ty),* $(,)?) => {
        $crate::declare_layers!(
            @exports []
            ::std::vec![$($crate::LayerRegistration::of::<$layer>()),*]
        );
    };
}
