//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor an explicit filter is given.
pub const DEFAULT_FILTER: &str = "info,dither=debug,dither_renderer=debug,dither_rhi=info";

/// Initialize tracing with the default filter.
///
/// `RUST_LOG` overrides the default when set.
///
/// # Example
/// ```
/// dither_core::init_logging();
/// tracing::info!("Renderer starting");
/// ```
pub fn init_logging() {
    init_logging_with(DEFAULT_FILTER);
}

/// Initialize tracing with `filter` as the fallback directive string.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging_with(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging();
        init_logging_with("warn");
    }
}
