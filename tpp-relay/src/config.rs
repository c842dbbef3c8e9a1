//! Configuration for the relay core.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Controls how error envelopes are built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingConfig {
    /// Attach the transport cause as a `cause` extension.
    pub include_cause_extension: bool,

    /// Truncate extension keys and values.
    pub truncate_extensions: bool,
}

/// Configuration for the relay core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL of the switch participant directory.
    pub switch_endpoint: String,

    /// Timeout for outbound callback requests in seconds.
    pub request_timeout_secs: u64,

    /// Error envelope settings.
    pub error_handling: ErrorHandlingConfig,

    /// Static endpoint registrations: participant -> callback type -> URL.
    /// When present, these are used instead of querying the switch.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub endpoints: HashMap<String, HashMap<String, String>>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            switch_endpoint: "http://localhost:3001".to_string(),
            request_timeout_secs: 30,
            error_handling: ErrorHandlingConfig::default(),
            endpoints: HashMap::new(),
        }
    }
}

impl RelayConfig {
    /// Checks that the configured URLs are usable.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.switch_endpoint).map_err(|e| {
            Error::Configuration(format!(
                "Invalid switch endpoint '{}': {}",
                self.switch_endpoint, e
            ))
        })?;

        for (participant, types) in &self.endpoints {
            for (callback_type, endpoint) in types {
                url::Url::parse(endpoint).map_err(|e| {
                    Error::Configuration(format!(
                        "Invalid {} endpoint for {}: {}",
                        callback_type, participant, e
                    ))
                })?;
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::Configuration(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout_secs, 30);
        assert!(!config.error_handling.include_cause_extension);
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let config = RelayConfig {
            switch_endpoint: "not a url".to_string(),
            ..RelayConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid switch endpoint"));

        let mut config = RelayConfig::default();
        config.endpoints.insert(
            "dfsp1".to_string(),
            HashMap::from([("FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE".to_string(), "::".to_string())]),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RelayConfig = serde_json::from_str(
            r#"{ "switch_endpoint": "http://central-ledger:3001",
                 "error_handling": { "include_cause_extension": true } }"#,
        )
        .unwrap();
        assert_eq!(config.switch_endpoint, "http://central-ledger:3001");
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.error_handling.include_cause_extension);
        assert!(!config.error_handling.truncate_extensions);
    }
}
