//! Structured logging setup: an `EnvFilter` sourced from `RUST_LOG`
//! (falling back to `info`) with a `LOG_FORMAT=json` escape hatch for
//! log-aggregator-friendly output.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber. Safe to call once at process
/// startup; calling it twice would panic (tracing's own guarantee), so
/// callers should only invoke this from `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
