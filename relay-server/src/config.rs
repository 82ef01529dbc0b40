//! Configuration loading for the relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! section and field is optional and falls back to the defaults below.

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for the relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Per-connection limits.
    pub limits: LimitsConfig,
    /// Routing policy.
    pub routing: RoutingConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the websocket listener (default: 127.0.0.1:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Per-connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Capacity of each connection's delivery queue (default: 256).
    /// Envelopes routed to a full queue are dropped.
    #[serde(default = "default_delivery_queue_capacity")]
    pub delivery_queue_capacity: usize,
    /// Maximum size of a single websocket frame in bytes (default: 1MB).
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Timeout in seconds for receiving NEW_CONNECTION after the upgrade (default: 10).
    #[serde(default = "default_hello_timeout_secs")]
    pub hello_timeout_secs: u64,
    /// Maximum connection attempts per public key per minute (default: 10).
    #[serde(default = "default_connections_per_key")]
    pub connections_per_key: u32,
    /// Maximum envelopes per sender key per minute (default: 600).
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,
    /// How often idle rate limiter entries are dropped, in seconds (default: 60).
    #[serde(default = "default_limiter_cleanup_interval_secs")]
    pub limiter_cleanup_interval_secs: u64,
}

/// Routing policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingConfig {
    /// Send an ERROR envelope back to the sender when routing fails (default: false).
    #[serde(default)]
    pub notify_sender_on_failure: bool,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Bind address for HTTP server (default: 127.0.0.1:9090).
    #[serde(default = "default_http_bind")]
    pub bind_address: String,
    /// Serve /health and /metrics (default: true).
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_delivery_queue_capacity() -> usize {
    256
}

fn default_max_frame_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_hello_timeout_secs() -> u64 {
    10
}

fn default_connections_per_key() -> u32 {
    10
}

fn default_messages_per_minute() -> u32 {
    600
}

fn default_limiter_cleanup_interval_secs() -> u64 {
    60
}

fn default_http_bind() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_http_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            delivery_queue_capacity: default_delivery_queue_capacity(),
            max_frame_size: default_max_frame_size(),
            hello_timeout_secs: default_hello_timeout_secs(),
            connections_per_key: default_connections_per_key(),
            messages_per_minute: default_messages_per_minute(),
            limiter_cleanup_interval_secs: default_limiter_cleanup_interval_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_http_bind(),
            enabled: default_http_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check addresses and limits before the server starts.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_address(&self.server.bind_address)?;
        if self.http.enabled {
            validate_address(&self.http.bind_address)?;
        }

        let limits = &self.limits;
        let checks = [
            ("limits.delivery_queue_capacity", limits.delivery_queue_capacity == 0),
            ("limits.max_frame_size", limits.max_frame_size == 0),
            ("limits.hello_timeout_secs", limits.hello_timeout_secs == 0),
            ("limits.connections_per_key", limits.connections_per_key == 0),
            ("limits.messages_per_minute", limits.messages_per_minute == 0),
            (
                "limits.limiter_cleanup_interval_secs",
                limits.limiter_cleanup_interval_secs == 0,
            ),
        ];
        match checks.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((name, _)) => Err(ConfigError::InvalidLimit { name }),
            None => Ok(()),
        }
    }
}

/// Validate a `host:port` bind address.
///
/// Port 0 asks the OS for an ephemeral port and is accepted. Ports 1-1023
/// are privileged and rejected.
pub fn validate_address(address: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("port not specified (example: 127.0.0.1:8080)"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(invalid("invalid host (example: 127.0.0.1:8080)"));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| invalid("invalid port (example: 127.0.0.1:8080)"))?;

    if (1..1024).contains(&port) {
        return Err(ConfigError::PrivilegedPort {
            address: address.to_string(),
            port,
        });
    }
    Ok(())
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Bind address is not a usable `host:port`.
    #[error("invalid address {address}: {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Bind address uses a privileged port.
    #[error("port {port} in {address} is privileged (below 1024)")]
    PrivilegedPort {
        /// The rejected address.
        address: String,
        /// The privileged port.
        port: u16,
    },
    /// A limit that must be positive is zero.
    #[error("{name} must be greater than zero")]
    InvalidLimit {
        /// Config key of the limit.
        name: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:8080");
        assert_eq!(config.limits.delivery_queue_capacity, 256);
        assert!(!config.routing.notify_sender_on_failure);
        config.validate().unwrap();
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "0.0.0.0:5000"

[limits]
delivery_queue_capacity = 8
max_frame_size = 4096

[routing]
notify_sender_on_failure = true

[http]
bind_address = "0.0.0.0:9191"
enabled = false
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:5000");
        assert_eq!(config.limits.delivery_queue_capacity, 8);
        assert_eq!(config.limits.max_frame_size, 4096);
        assert_eq!(config.limits.hello_timeout_secs, 10);
        assert!(config.routing.notify_sender_on_failure);
        assert_eq!(config.http.bind_address, "0.0.0.0:9191");
        assert!(!config.http.enabled);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.limits.max_frame_size, 1024 * 1024);
        assert_eq!(config.limits.messages_per_minute, 600);
        assert_eq!(config.http.bind_address, "127.0.0.1:9090");
    }

    #[test]
    fn config_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\ndelivery_queue_capacity = 3").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.limits.delivery_queue_capacity, 3);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::from_file(std::path::Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\ndelivery_queue_capacity = \"many\"").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn addresses_validated() {
        validate_address("127.0.0.1:8080").unwrap();
        validate_address("localhost:9000").unwrap();
        validate_address("[::1]:8080").unwrap();
        validate_address("127.0.0.1:0").unwrap();

        assert!(matches!(
            validate_address("This is a very invalid address."),
            Err(ConfigError::InvalidAddress { .. })
        ));
        assert!(matches!(
            validate_address("127.0.0.1"),
            Err(ConfigError::InvalidAddress { .. })
        ));
        assert!(matches!(
            validate_address(":8080"),
            Err(ConfigError::InvalidAddress { .. })
        ));
        assert!(matches!(
            validate_address("127.0.0.1:99999"),
            Err(ConfigError::InvalidAddress { .. })
        ));
        assert!(matches!(
            validate_address("127.0.0.1:1001"),
            Err(ConfigError::PrivilegedPort { port: 1001, .. })
        ));
    }

    #[test]
    fn zero_limits_rejected() {
        let mut config = Config::default();
        config.limits.delivery_queue_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLimit {
                name: "limits.delivery_queue_capacity"
            })
        ));
    }

    #[test]
    fn disabled_http_address_not_checked() {
        let mut config = Config::default();
        config.http.enabled = false;
        config.http.bind_address = "nonsense".to_string();
        config.validate().unwrap();
    }
}
