//! Relay configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Relay configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: PostgreSQL URL; unset runs against in-memory storage
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `OUTBOX_BATCH_SIZE`: rows per batch (default: `100`)
/// - `OUTBOX_ITERATIONS`: batches to run, `0` for no limit (default: `1`)
/// - `OUTBOX_DELAY_SECS`: wait after an empty batch (default: `5`)
/// - `OUTBOX_DAEMON`: `true` forces `OUTBOX_ITERATIONS=0` (default: `false`)
/// - `OUTBOX_DOMAIN`: routing key prefix (default: `"order"`)
/// - `KAFKA_BROKERS`: broker list, used when built with the `kafka` feature
/// - `METRICS_ADDR`: Prometheus listen address (default: disabled)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub batch_size: usize,
    pub iterations: u64,
    pub delay: Duration,
    pub domain: String,
    pub kafka_brokers: Option<String>,
    pub metrics_addr: Option<SocketAddr>,
    pub log_format: LogFormat,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`; unset or unparsable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let daemon = non_empty(&lookup, "OUTBOX_DAEMON")
            .is_some_and(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "yes"));
        let iterations = if daemon {
            0
        } else {
            parsed(&lookup, "OUTBOX_ITERATIONS").unwrap_or(defaults.iterations)
        };

        Self {
            database_url: non_empty(&lookup, "DATABASE_URL"),
            max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            batch_size: parsed(&lookup, "OUTBOX_BATCH_SIZE")
                .filter(|size: &usize| *size > 0)
                .unwrap_or(defaults.batch_size),
            iterations,
            delay: parsed(&lookup, "OUTBOX_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.delay),
            domain: non_empty(&lookup, "OUTBOX_DOMAIN").unwrap_or(defaults.domain),
            kafka_brokers: non_empty(&lookup, "KAFKA_BROKERS"),
            metrics_addr: parsed(&lookup, "METRICS_ADDR"),
            log_format: match non_empty(&lookup, "LOG_FORMAT") {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            log_level: non_empty(&lookup, "RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Returns true when the relay runs until a shutdown signal.
    pub fn is_daemon(&self) -> bool {
        self.iterations == 0
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    non_empty(lookup, key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            batch_size: 100,
            iterations: 1,
            delay: Duration::from_secs(5),
            domain: outbox::DEFAULT_DOMAIN.to_string(),
            kafka_brokers: None,
            metrics_addr: None,
            log_format: LogFormat::Text,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.iterations, 1);
        assert_eq!(config.delay, Duration::from_secs(5));
        assert_eq!(config.domain, "order");
        assert!(!config.is_daemon());
    }

    #[test]
    fn test_values_from_environment() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("OUTBOX_BATCH_SIZE", "25"),
            ("OUTBOX_ITERATIONS", "3"),
            ("OUTBOX_DELAY_SECS", "1"),
            ("OUTBOX_DOMAIN", "sales"),
            ("METRICS_ADDR", "127.0.0.1:9000"),
            ("LOG_FORMAT", "JSON"),
        ]);

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/orders")
        );
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.iterations, 3);
        assert_eq!(config.delay, Duration::from_secs(1));
        assert_eq!(config.domain, "sales");
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_daemon_flag_overrides_iterations() {
        let config = config_from(&[("OUTBOX_DAEMON", "true"), ("OUTBOX_ITERATIONS", "7")]);
        assert_eq!(config.iterations, 0);
        assert!(config.is_daemon());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("OUTBOX_BATCH_SIZE", "0"),
            ("OUTBOX_ITERATIONS", "many"),
            ("DATABASE_URL", "  "),
            ("METRICS_ADDR", "not-an-address"),
        ]);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.iterations, 1);
        assert!(config.database_url.is_none());
        assert!(config.metrics_addr.is_none());
    }
}
