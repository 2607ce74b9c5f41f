//! Error taxonomy of the hot-reload core
//!
//! None of these escape an [`Entry`](crate::entry::Entry): the strategies log
//! them and settle into a well-defined state.

use std::fmt;
use std::path::PathBuf;

use tickswap_kernel::LayerError;

/// Module Locator errors
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    #[error("Module file not found: {}", path.display())]
    MissingModuleFile { path: PathBuf },

    #[error("Failed to stage {} -> {}: {source}", from.display(), to.display())]
    StageCopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Module load error types
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Module file not found: {}", .0.display())]
    MissingModuleFile(PathBuf),

    #[error("Failed to load library {}: {message}", path.display())]
    Library { path: PathBuf, message: String },

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("API version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Malformed module {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Layer {layer} (#{index}) failed to instantiate: {reason}")]
    Instantiation {
        layer: String,
        index: usize,
        reason: String,
    },

    #[error("Domain already hosts a loader proxy")]
    AlreadyLoaded,
}

/// Which layer hook failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Attach,
    Update,
    Detach,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Attach => write!(f, "attach"),
            Hook::Update => write!(f, "update"),
            Hook::Detach => write!(f, "detach"),
        }
    }
}

/// How a hook failed
///
/// Layers built by a module report their panics as
/// [`LayerError::Panicked`]; those are classified as [`HookFailure::Panicked`].
#[derive(Debug, thiserror::Error)]
pub enum HookFailure {
    #[error(transparent)]
    Returned(#[from] LayerError),

    #[error("panicked: {0}")]
    Panicked(String),
}

/// A single layer hook failed; the rest of the batch still ran.
#[derive(Debug, thiserror::Error)]
#[error("Layer {layer} failed in {hook}: {failure}")]
pub struct LayerHookError {
    pub layer: String,
    pub hook: Hook,
    #[source]
    pub failure: HookFailure,
}

impl HookFailure {
    /// Classify an error a layer hook returned.
    pub fn from_layer(error: LayerError) -> Self {
        match error {
            LayerError::Panicked(message) => HookFailure::Panicked(message),
            other => HookFailure::Returned(other),
        }
    }
}

impl LayerHookError {
    /// Whether the hook panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        matches!(self.failure, HookFailure::Panicked(_))
    }
}

/// Domain teardown errors. The domain is abandoned regardless.
#[derive(Debug, thiserror::Error)]
pub enum DomainTeardownError {
    #[error("Failed to close module {}: {message}", path.display())]
    Close { path: PathBuf, message: String },

    #[error("Layer {layer} panicked while being dropped")]
    DropPanicked { layer: String },
}

/// Reload error types
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("Locate error: {0}")]
    Locate(#[from] LocatorError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),
}

pub(crate) use tickswap_kernel::panic_message;
