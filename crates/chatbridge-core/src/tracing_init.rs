//! Shared tracing/logging initialization.
//!
//! The relay binary and any future sidecar tooling set up `tracing_subscriber`
//! the same way: an env-filter plus optional JSON output.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default filter directive for a binary at the given level.
///
/// Covers the binary's own crate and `chatbridge_core`, so normalization and
/// config warnings are visible at the same verbosity.
pub fn default_filter(crate_name: &str, level: &str) -> String {
    format!("{crate_name}={level},chatbridge_core={level}")
}

/// Resolve the filter: `RUST_LOG` wins, otherwise `crate_name` and core at `level`.
fn resolve_filter(rust_log: Option<&str>, crate_name: &str, level: &str) -> EnvFilter {
    match rust_log.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::new(default_filter(crate_name, level)),
    }
}

/// Initialise the global tracing subscriber for the binary `crate_name`.
///
/// `level` applies when `RUST_LOG` is unset or empty. With `log_json` the
/// subscriber emits one JSON object per line.
pub fn init_tracing(crate_name: &str, level: &str, log_json: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let env_filter = resolve_filter(rust_log.as_deref(), crate_name, level);
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_core() {
        assert_eq!(
            default_filter("chatbridge_relay", "debug"),
            "chatbridge_relay=debug,chatbridge_core=debug"
        );
    }

    #[test]
    fn rust_log_overrides_level() {
        let filter = resolve_filter(Some("warn"), "chatbridge_relay", "debug");
        assert_eq!(filter.to_string(), EnvFilter::new("warn").to_string());
    }

    #[test]
    fn empty_rust_log_falls_back_to_level() {
        let filter = resolve_filter(Some("  "), "chatbridge_relay", "info");
        assert_eq!(
            filter.to_string(),
            EnvFilter::new("chatbridge_relay=info,chatbridge_core=info").to_string()
        );
    }
}
