//! Configuration for the TPP HTTP gateway.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tpp_relay::RelayConfig;

use crate::error::{Error, Result};
use crate::event::EventLoggerConfig;

/// Configuration for the TPP HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TppHttpConfig {
    /// The host address to bind to.
    pub host: String,

    /// The port to bind to. Port 0 picks a free port.
    pub port: u16,

    /// Relay settings: switch directory, timeouts, error envelopes.
    pub relay: RelayConfig,

    /// Optional event logger configuration.
    /// If not provided, no event logging will be performed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_logger: Option<EventLoggerConfig>,
}

impl Default for TppHttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4003,
            relay: RelayConfig::default(),
            event_logger: Some(EventLoggerConfig::default()),
        }
    }
}

impl TppHttpConfig {
    /// Returns the full server address as a string (e.g., "127.0.0.1:4003").
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loads a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TppHttpConfig::default();
        assert_eq!(config.server_addr(), "127.0.0.1:4003");
        assert_eq!(config.relay.switch_endpoint, "http://localhost:3001");
        assert!(config.event_logger.is_some());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "port": 8080,
                "relay": {{
                    "switch_endpoint": "http://central-ledger:3001",
                    "error_handling": {{ "include_cause_extension": true }}
                }}
            }}"#
        )
        .unwrap();

        let config = TppHttpConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.relay.switch_endpoint, "http://central-ledger:3001");
        assert!(config.relay.error_handling.include_cause_extension);
    }

    #[test]
    fn test_from_file_errors() {
        let err = TppHttpConfig::from_file("/nonexistent/tpp-http.json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = TppHttpConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }
}
