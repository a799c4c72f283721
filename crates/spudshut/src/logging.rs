//! Subscriber setup for the CLI.
//!
//! `log` records from the store and worker code are forwarded into
//! `tracing`, so both end up in one formatted stream on stderr.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Env var holding a filter directive, e.g. `spudshut=debug,reqwest=warn`.
pub const LOG_ENV: &str = "SPUDSHUT_LOG";

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "spudshut=debug,info",
        _ => "spudshut=trace,debug",
    }
}

fn build_filter(verbosity: u8) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(raw) if !raw.trim().is_empty() => match raw.parse::<EnvFilter>() {
            Ok(filter) => filter,
            Err(e) => {
                eprintln!(
                    "WARN: {}='{}' is not a valid filter ({}); using the default",
                    LOG_ENV, raw, e
                );
                EnvFilter::new(default_directive(verbosity))
            }
        },
        _ => EnvFilter::new(default_directive(verbosity)),
    }
}

/// Installs the global subscriber. Calling it twice is harmless; the first
/// subscriber stays.
pub fn init(verbosity: u8, json: bool) {
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("WARN: log forwarding not installed: {}", e);
    }

    let registry = tracing_subscriber::registry().with(build_filter(verbosity));
    let result = if json {
        tracing::subscriber::set_global_default(
            registry.with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_target(true).with_writer(std::io::stderr)),
        )
    };
    if let Err(e) = result {
        eprintln!("WARN: tracing subscriber not installed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_directive_grows_with_verbosity() {
        assert_eq!(default_directive(0), "info");
        assert!(default_directive(1).contains("spudshut=debug"));
        assert!(default_directive(5).contains("spudshut=trace"));
    }

    #[test]
    #[serial]
    fn test_invalid_env_filter_falls_back() {
        std::env::set_var(LOG_ENV, "spudshut=notalevel");
        let filter = build_filter(0);
        assert_eq!(filter.to_string(), "info");
        std::env::remove_var(LOG_ENV);
    }

    #[test]
    #[serial]
    fn test_env_filter_wins() {
        std::env::set_var(LOG_ENV, "warn");
        assert_eq!(build_filter(2).to_string(), "warn");
        std::env::remove_var(LOG_ENV);
    }
}
