//! Panic containment on the module side of the boundary
//!
//! A module built as a `cdylib` links its own copy of std. A panic that
//! unwinds out of module code reaches the host as a foreign exception, which
//! the host's `catch_unwind` cannot stop. Everything here is instantiated
//! inside the module, so the module's own unwinder catches its panics and
//! only a [`LayerError`] crosses back.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;

/// Run `f`, turning a panic into [`LayerError::Panicked`].
pub fn catch_panic<R>(f: impl FnOnce() -> LayerResult<R>) -> LayerResult<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(LayerError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Layer wrapper whose hooks and drop never unwind.
pub(crate) struct Guarded {
    type_name: &'static str,
    inner: Option<Box<dyn Layer>>,
}

impl Guarded {
    pub(crate) fn wrap(type_name: &'static str, inner: Box<dyn Layer>) -> Box<dyn Layer> {
        Box::new(Self {
            type_name,
            inner: Some(inner),
        })
    }

    fn call(&mut self, hook: impl FnOnce(&mut dyn Layer) -> LayerResult<()>) -> LayerResult<()> {
        match self.inner.as_mut() {
            Some(layer) => catch_panic(move || hook(layer.as_mut())),
            None => Ok(()),
        }
    }
}

impl Layer for Guarded {
    fn attach(&mut self) -> LayerResult<()> {
        self.call(|layer| layer.attach())
    }

    fn update(&mut self) -> LayerResult<()> {
        self.call(|layer| layer.update())
    }

    fn detach(&mut self) -> LayerResult<()> {
        self.call(|layer| layer.detach())
    }
}

impl Drop for Guarded {
    fn drop(&mut self) {
        if let Some(layer) = self.inner.take() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || drop(layer))) {
                // No dispatcher is shared with the host here.
                eprintln!(
                    "layer {} panicked while dropped: {}",
                    self.type_name,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}
