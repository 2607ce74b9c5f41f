//! Layer module built by the native integration tests.
//!
//! | Features | Layers | Notes |
//! |---|---|---|
//! | none | `Steady`, `Counter` | |
//! | `panicky` | `Steady`, `Boom` | `Boom::update` panics |
//! | `skewed` | none | exports a wrong `_tickswap_api_version` |
//! | `dependent` | adds `Linked` | needs `libcompanion` loaded globally |

use tickswap_kernel::{Layer, LayerRegistration, LayerResult};

#[derive(Default)]
pub struct Steady {
    updates: u64,
}

impl Layer for Steady {
    fn update(&mut self) -> LayerResult<()> {
        self.updates += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct Counter {
    count: u64,
}

impl Layer for Counter {
    fn update(&mut self) -> LayerResult<()> {
        self.count = self.count.wrapping_add(1);
        Ok(())
    }

    fn detach(&mut self) -> LayerResult<()> {
        self.count = 0;
        Ok(())
    }
}

#[derive(Default)]
pub struct Boom;

impl Layer for Boom {
    fn update(&mut self) -> LayerResult<()> {
        panic!("Boom::update exploded");
    }
}

#[cfg(all(feature = "dependent", not(test)))]
mod linked {
    use tickswap_kernel::{Layer, LayerError, LayerResult};

    unsafe extern "C" {
        fn tickswap_companion_value() -> u32;
    }

    #[derive(Default)]
    pub struct Linked;

    impl Layer for Linked {
        fn attach(&mut self) -> LayerResult<()> {
            // SAFETY: plain C function exported by the companion library.
            match unsafe { tickswap_companion_value() } {
                42 => Ok(()),
                other => Err(LayerError::failed(format!("companion returned {other}"))),
            }
        }
    }
}

fn layer_table() -> Vec<LayerRegistration> {
    let mut table = vec![LayerRegistration::of::<Steady>()];
    #[cfg(feature = "panicky")]
    table.push(LayerRegistration::of::<Boom>());
    #[cfg(not(feature = "panicky"))]
    table.push(LayerRegistration::of::<Counter>());
    #[cfg(all(feature = "dependent", not(test)))]
    table.push(LayerRegistration::of::<linked::Linked>());
    table
}

#[cfg(all(not(feature = "skewed"), feature = "dependent"))]
tickswap_kernel::declare_layers!(depends_on = ["companion"]; table = layer_table);

#[cfg(all(not(feature = "skewed"), not(feature = "dependent")))]
tickswap_kernel::declare_layers!(table = layer_table);

#[cfg(feature = "skewed")]
#[unsafe(no_mangle)]
pub extern "C" fn _tickswap_api_version() -> u32 {
    tickswap_kernel::LAYER_API_VERSION + 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let names: Vec<_> = layer_table()
            .iter()
            .map(|r| r.type_name().to_string())
            .collect();
        if cfg!(feature = "panicky") {
            assert_eq!(names, ["Steady", "Boom"]);
        } else {
            assert_eq!(names, ["Steady", "Counter"]);
        }
    }

    #[test]
    fn test_boom_is_contained() {
        let mut boom = LayerRegistration::of::<Boom>().instantiate().unwrap();
        assert!(boom.update().is_err());
    }
}
