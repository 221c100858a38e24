// ============================================================================
// Logging
// Optional fmt subscriber for hosts that do not install their own
// ============================================================================

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

/// Install a global fmt subscriber filtered by `filter`
/// (e.g. `"fx_reconcile=debug"`). `RUST_LOG` wins when set.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(filter: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stdout_layer = fmt::layer().with_target(true).with_filter(filter);
    tracing_subscriber::registry().with(stdout_layer).try_init()
}
