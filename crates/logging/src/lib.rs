//! Structured logging setup for every GarlicRouter binary.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global `tracing` subscriber: `RUST_LOG` if set, otherwise
/// `info` for everything plus `debug` for this crate family.
pub fn init() {
    init_with_default_filter("info,garlicrouter=debug");
}

/// Same as [`init`], but with an explicit fallback filter string for
/// callers that want a different default (e.g. tests wanting more
/// verbosity on just one subsystem).
pub fn init_with_default_filter(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry().with(fmt::layer()).with(filter).try_init();
}
