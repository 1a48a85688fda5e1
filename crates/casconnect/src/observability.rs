//! Logging setup for applications embedding the coordinator.
//!
//! The library itself only emits `tracing` events; nothing is printed unless
//! the host installs a subscriber, either its own or the one built here.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Install a global subscriber writing to stderr.
///
/// `RUST_LOG` wins over `config.log_level`. Returns false when a global
/// subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(from_env.as_deref(), &config.log_level);

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

/// First directive set that parses: environment, configured level, `info`.
fn build_filter(from_env: Option<&str>, level: &str) -> EnvFilter {
    from_env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LoggingConfig {
            log_level: "warn".to_string(),
            json_logs: false,
        };
        init_logging(&config);
        assert!(!init_logging(&config));
    }

    #[test]
    fn test_filter_precedence() {
        assert_eq!(build_filter(Some("debug"), "warn").to_string(), "debug");
        assert_eq!(build_filter(None, "warn").to_string(), "warn");
        assert_eq!(build_filter(Some("casconnect=loud"), "warn").to_string(), "warn");
    }

    #[test]
    fn test_bad_level_falls_back_to_info() {
        assert_eq!(build_filter(None, "casconnect=loud").to_string(), "info");
    }
}
