//! Process-wide tracing setup.

use std::sync::Once;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "scanout=debug,scanout_core=debug";

/// Initialize logging to journald.
/// Filter controlled by RUST_LOG env var (default: [`DEFAULT_FILTER`]).
/// View logs with: journalctl --user -t scanout -f
pub fn init() {
    static INIT_LOG: Once = Once::new();
    INIT_LOG.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        // Try journald first, fall back to stderr
        if let Ok(journald) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(filter)
                .with(journald.with_syslog_identifier("scanout".to_string()))
                .init();
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    });
}
