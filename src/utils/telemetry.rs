//! Tracing/logging initialization

use std::sync::Once;
use tracing::{debug, warn};

use crate::types::{ErrorKind, LedgerError};

static TRACING_INIT: Once = Once::new();

/// Installs a global fmt subscriber filtered by `RUST_LOG`
/// (default `ledger_core=info`).
///
/// Safe to call multiple times; only the first call has an effect, and an
/// already-installed subscriber is left in place.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ledger_core=info"));

        let _ = fmt().with_env_filter(filter).with_target(true).try_init();
    });
}

/// Log a rejected operation: integrity failures at `warn`, the rest at `debug`
pub(crate) fn log_rejection(operation: &str, error: &LedgerError) {
    match error.kind() {
        ErrorKind::Integrity => warn!(operation, kind = ?error.kind(), %error, "rejected"),
        kind => debug!(operation, ?kind, %error, "rejected"),
    }
}
