//! Tracing subscriber setup for the `ibex` binary.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Crate targets logged when `RUST_LOG` is unset.
const TARGETS: [&str; 2] = ["ibex", "ibex_lib"];

/// Filter used when `RUST_LOG` is not set.
pub fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

/// Build the subscriber: compact lines on stderr so the dev server keeps stdout.
pub fn build_subscriber(verbose: bool) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(verbose))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(verbose: bool) {
    if build_subscriber(verbose).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
