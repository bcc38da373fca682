//! Tracing setup for the `ripple` binary.
//!
//! Logs always go to stderr: `dispatch`, `deps` and `listen` print JSON on
//! stdout, and log lines must never interleave with it.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// HTTP stack crates that are chatty at debug level.
const QUIET_DEPENDENCIES: &[&str] = &["hyper=warn", "h2=warn", "reqwest=warn", "rustls=warn"];

/// Filter used when `RUST_LOG` is unset: `level` for ripple, warn for the
/// HTTP stack underneath the GitHub, oracle and webhook clients.
fn default_directives(level: Level) -> String {
    std::iter::once(level.as_str().to_ascii_lowercase())
        .chain(QUIET_DEPENDENCIES.iter().map(|d| d.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let format = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let format = if json {
        format.json().boxed()
    } else {
        format.boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_quiet_http_stack() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("hyper=warn"));
        assert!(directives.contains("reqwest=warn"));
        EnvFilter::try_new(&directives).unwrap();
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }
}
