//! Process-wide logging setup shared by services embedding the engine.

/// Install the JSON subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; only the first call installs anything.
pub fn init() {
    tracing::init("info");
}

/// Subscriber construction and filter defaults.
pub mod tracing;
