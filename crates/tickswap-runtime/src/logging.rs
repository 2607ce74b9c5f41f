//! Diagnostics sink setup
//!
//! The core only emits `tracing` events; hosts that do not install their own
//! subscriber can call [`init`].

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over [`LogConfig::filter`]. Returns an error if
/// a global subscriber is already set.
pub fn init(config: &LogConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_file(config.show_source)
                    .with_line_number(config.show_source),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_file(config.show_source)
                    .with_line_number(config.show_source),
            )
            .try_init()
    }
}
