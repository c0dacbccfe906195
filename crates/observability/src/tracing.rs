//! JSON log subscriber.
//!
//! Every authentication decision is emitted as a structured event with a
//! `principal_id` field, so the output can be indexed without parsing
//! message text.

use tracing_subscriber::EnvFilter;

/// Install a JSON subscriber. `RUST_LOG` wins over `default_directive`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(default_directive: &str) -> bool {
    let filter = filter(default_directive);

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        ::tracing::debug!(default_directive, "json subscriber installed");
    }
    installed
}

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_noop() {
        init("debug");
        assert!(!init("debug"));
        crate::init();
    }

    #[test]
    fn bad_directive_falls_back() {
        // Must not panic on an unparsable default.
        let _ = filter("gatekeep_auth=[");
    }
}
