//! stderr logging setup.
//!
//! stdout is reserved for command output (text tables or JSON), so every log
//! line goes to stderr.

use tracing_subscriber::{EnvFilter, fmt};

/// Builds the filter: `RUST_LOG` when set, otherwise `default_directive`.
fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// Returns `false` when a subscriber was already installed (tests install
/// one per process at most).
pub fn init(default_directive: &str) -> bool {
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter(default_directive))
        .with_target(false)
        .try_init()
        .is_ok()
}
