//! Gateway configuration, parsed from flags and environment variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use reqwest::Url;

/// Errors raised while parsing or validating [`GatewayConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("endpoint `{spec}` must have the form NAME=URL")]
    MalformedEndpoint { spec: String },
    #[error("endpoint `{name}` has an invalid url: {reason}")]
    InvalidUrl { name: String, reason: String },
    #[error("endpoint `{name}` must use http or https, got `{scheme}`")]
    UnsupportedScheme { name: String, scheme: String },
    #[error("no endpoints configured: pass --endpoint or --message-endpoint")]
    NoEndpoints,
    #[error("fan-out timeout must be greater than zero")]
    ZeroTimeout,
    #[error("max body size must be greater than zero")]
    ZeroBodyLimit,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line, human readable.
    Pretty,
    /// Single-line, human readable.
    Compact,
}

/// A named backend, written on the command line as `NAME=URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub name: String,
    pub url: Url,
}

impl FromStr for EndpointSpec {
    type Err = ConfigError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let Some((name, url)) = spec.split_once('=') else {
            return Err(ConfigError::MalformedEndpoint {
                spec: spec.to_string(),
            });
        };
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || url.is_empty() {
            return Err(ConfigError::MalformedEndpoint {
                spec: spec.to_string(),
            });
        }

        let url = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme {
                name: name.to_string(),
                scheme: url.scheme().to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            url,
        })
    }
}

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.url)
    }
}

/// Top-level gateway configuration.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fanout-gateway",
    version,
    about = "Races every configured backend and answers with the first success"
)]
pub struct GatewayConfig {
    /// Bind address.
    #[arg(long, default_value = "0.0.0.0", env = "FANOUT_HOST")]
    pub host: String,

    /// Port to listen on. 0 means OS-assigned.
    #[arg(long, default_value_t = 6100, env = "FANOUT_PORT")]
    pub port: u16,

    /// HTTP backend raced by `/fanout/*` (repeatable, NAME=URL).
    #[arg(
        long = "endpoint",
        value_name = "NAME=URL",
        env = "FANOUT_ENDPOINTS",
        value_delimiter = ','
    )]
    pub endpoints: Vec<EndpointSpec>,

    /// Message backend raced by `POST /message` (repeatable, NAME=URL).
    #[arg(
        long = "message-endpoint",
        value_name = "NAME=URL",
        env = "FANOUT_MESSAGE_ENDPOINTS",
        value_delimiter = ','
    )]
    pub message_endpoints: Vec<EndpointSpec>,

    /// Deadline placed on every fan-out, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "FANOUT_TIMEOUT_MS")]
    pub fanout_timeout_ms: u64,

    /// Largest accepted request body.
    #[arg(long, default_value_t = 1_048_576, env = "FANOUT_MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    /// Cancel and abort losing attempts once a fan-out is decided.
    #[arg(long, env = "FANOUT_CANCEL_LOSERS")]
    pub cancel_losers: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value = "json", env = "FANOUT_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "FANOUT_LOG_LEVEL")]
    pub log_level: String,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "FANOUT_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6100,
            endpoints: Vec::new(),
            message_endpoints: Vec::new(),
            fanout_timeout_ms: 30_000,
            max_body_bytes: 1_048_576, // 1 MiB
            cancel_losers: false,
            log_format: LogFormat::Json,
            log_level: "info".to_string(),
            metrics_port: None,
        }
    }
}

impl GatewayConfig {
    /// Checks cross-field constraints clap cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoEndpoints`] when neither call site has a backend,
    /// [`ConfigError::ZeroTimeout`] for a zero deadline, and
    /// [`ConfigError::ZeroBodyLimit`] for a zero body limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() && self.message_endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.fanout_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }
        Ok(())
    }

    #[must_use]
    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_millis(self.fanout_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> EndpointSpec {
        s.parse().unwrap()
    }

    #[test]
    fn gateway_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 6100);
        assert_eq!(config.fanout_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_body_bytes, 1_048_576);
        assert!(!config.cancel_losers);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.metrics_port.is_none());
    }

    #[test]
    fn clap_defaults_match_default_impl() {
        let parsed = GatewayConfig::try_parse_from(["fanout-gateway"]).unwrap();
        let default = GatewayConfig::default();
        assert_eq!(parsed.host, default.host);
        assert_eq!(parsed.port, default.port);
        assert_eq!(parsed.fanout_timeout_ms, default.fanout_timeout_ms);
        assert_eq!(parsed.max_body_bytes, default.max_body_bytes);
        assert_eq!(parsed.log_level, default.log_level);
    }

    #[test]
    fn parses_repeated_endpoints_and_flags() {
        let config = GatewayConfig::try_parse_from([
            "fanout-gateway",
            "--endpoint",
            "a=http://127.0.0.1:9001",
            "--endpoint",
            "b=http://127.0.0.1:9002/base",
            "--message-endpoint",
            "m=https://example.com/inbox",
            "--fanout-timeout-ms",
            "250",
            "--cancel-losers",
            "--log-format",
            "compact",
            "--metrics-port",
            "9100",
        ])
        .unwrap();

        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[1].name, "b");
        assert_eq!(config.endpoints[1].url.path(), "/base");
        assert_eq!(config.message_endpoints[0].name, "m");
        assert_eq!(config.fanout_timeout(), Duration::from_millis(250));
        assert!(config.cancel_losers);
        assert_eq!(config.log_format, LogFormat::Compact);
        assert_eq!(config.metrics_port, Some(9100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_endpoint_is_rejected_by_clap() {
        let result =
            GatewayConfig::try_parse_from(["fanout-gateway", "--endpoint", "no-equals-sign"]);
        assert!(result.is_err());
    }

    #[test]
    fn endpoint_spec_parsing() {
        let parsed = spec(" primary = http://10.0.0.1:8080 ");
        assert_eq!(parsed.name, "primary");
        assert_eq!(parsed.url.as_str(), "http://10.0.0.1:8080/");
        assert_eq!(parsed.to_string(), "primary=http://10.0.0.1:8080/");

        assert_eq!(
            "=http://x".parse::<EndpointSpec>().unwrap_err(),
            ConfigError::MalformedEndpoint {
                spec: "=http://x".to_string()
            }
        );
        assert!(matches!(
            "a=not a url".parse::<EndpointSpec>().unwrap_err(),
            ConfigError::InvalidUrl { .. }
        ));
        assert!(matches!(
            "a=ftp://host/file".parse::<EndpointSpec>().unwrap_err(),
            ConfigError::UnsupportedScheme { .. }
        ));
    }

    #[test]
    fn validate_rejects_unusable_configs() {
        let config = GatewayConfig::default();
        assert_eq!(config.validate(), Err(ConfigError::NoEndpoints));

        let config = GatewayConfig {
            message_endpoints: vec![spec("m=http://localhost:1")],
            fanout_timeout_ms: 0,
            ..GatewayConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));

        let config = GatewayConfig {
            endpoints: vec![spec("a=http://localhost:1")],
            max_body_bytes: 0,
            ..GatewayConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBodyLimit));
    }
}
