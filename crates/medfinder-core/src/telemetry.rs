//! Tracing initialization with a configurable log level.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Calling this twice is harmless; the second call is ignored.
pub fn init_tracing_with_level(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing_with_level("debug");
        init_tracing();
        tracing::debug!("still logging");
    }
}
