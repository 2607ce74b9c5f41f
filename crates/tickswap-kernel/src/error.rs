//! Typed errors returned by layer hooks and constructors.

use thiserror::Error;

/// Result type for layer hooks and constructors.
pub type LayerResult<T> = Result<T, LayerError>;

/// Errors a layer can report from a hook or from its constructor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LayerError {
    /// The hook or constructor could not complete.
    #[error("Layer failed: {0}")]
    Failed(String),

    /// An I/O error surfaced inside the layer.
    #[error("Layer I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// The hook or constructor panicked inside the module.
    #[error("Layer panicked: {0}")]
    Panicked(String),

    /// Catch-all for errors that don't fit the above categories.
    #[error("{0}")]
    Other(String),
}

impl LayerError {
    /// Shorthand for [`LayerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
