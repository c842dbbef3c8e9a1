//! Error handling for the relay core.
//!
//! Every failure the relay can observe is expressed as an [`Error`]. Each error
//! maps onto an FSPIOP API error code and can be rendered as the standardized
//! error envelope that is sent back to the originating participant.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::ErrorHandlingConfig;

/// Maximum extension key length when truncation is enabled.
const EXTENSION_KEY_LIMIT: usize = 32;

/// Maximum extension value length when truncation is enabled.
const EXTENSION_VALUE_LIMIT: usize = 128;

/// Error types for the relay core
#[derive(Error, Debug)]
pub enum Error {
    /// No callback endpoint is registered for the participant
    #[error("{message}")]
    RoutingUnavailable {
        /// Human readable description naming the callback type, request and participant
        message: String,
        /// The participant whose endpoint is missing
        participant: String,
    },

    /// The outbound request could not be delivered
    #[error("{message}")]
    Transport {
        /// Description of the failure
        message: String,
        /// Transport level detail (I/O error, timeout, response status)
        cause: Option<String>,
    },

    /// The compensating error callback failed after a primary failure
    #[error("{failure}")]
    Compensation {
        /// Why the error callback could not be delivered
        failure: Box<Error>,
        /// The primary failure that triggered compensation
        original: Box<Error>,
    },

    /// The participant endpoint directory could not be queried
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// Path parameters would not render into the templated callback URL
    #[error("{0}")]
    InvalidUrl(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for the relay core
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of relay failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Destination (or error destination) endpoint could not be resolved
    RoutingUnavailable,
    /// The dispatch call failed
    TransportFailure,
    /// The error callback failed during compensation
    CompensationFailure,
    /// Anything else (directory outage, configuration, serialization)
    Internal,
}

/// FSPIOP API error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiErrorCode {
    /// Four digit error code
    pub code: &'static str,
    /// Standard description for the code
    pub message: &'static str,
}

impl ApiErrorCode {
    pub const DESTINATION_COMMUNICATION_ERROR: ApiErrorCode = ApiErrorCode {
        code: "1001",
        message: "Destination communication error",
    };
    pub const INTERNAL_SERVER_ERROR: ApiErrorCode = ApiErrorCode {
        code: "2001",
        message: "Internal server error",
    };
    pub const GENERIC_CLIENT_ERROR: ApiErrorCode = ApiErrorCode {
        code: "3000",
        message: "Generic client error",
    };
    pub const UNKNOWN_URI: ApiErrorCode = ApiErrorCode {
        code: "3002",
        message: "Unknown URI",
    };
    pub const VALIDATION_ERROR: ApiErrorCode = ApiErrorCode {
        code: "3100",
        message: "Generic validation error",
    };
    pub const MISSING_ELEMENT: ApiErrorCode = ApiErrorCode {
        code: "3102",
        message: "Missing mandatory element",
    };
    pub const DESTINATION_FSP_ERROR: ApiErrorCode = ApiErrorCode {
        code: "3201",
        message: "Destination FSP Error",
    };
}

/// A single key/value extension of an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub key: String,
    pub value: String,
}

/// List of extensions attached to an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionList {
    pub extension: Vec<Extension>,
}

/// Body of the standardized error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInformation {
    pub error_code: String,
    pub error_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_list: Option<ExtensionList>,
}

/// Standardized error envelope: `{ "errorInformation": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorObject {
    pub error_information: ErrorInformation,
}

impl ApiErrorObject {
    /// Creates an envelope for the given code and message.
    pub fn new(code: ApiErrorCode, message: &str) -> Self {
        let error_description = if message.is_empty() {
            code.message.to_string()
        } else {
            format!("{} - {}", code.message, message)
        };
        Self {
            error_information: ErrorInformation {
                error_code: code.code.to_string(),
                error_description,
                extension_list: None,
            },
        }
    }

    /// Adds an extension entry, truncating key and value when requested.
    pub fn with_extension(mut self, key: &str, value: &str, truncate: bool) -> Self {
        let (key, value) = if truncate {
            (
                key.chars().take(EXTENSION_KEY_LIMIT).collect(),
                value.chars().take(EXTENSION_VALUE_LIMIT).collect(),
            )
        } else {
            (key.to_string(), value.to_string())
        };
        self.error_information
            .extension_list
            .get_or_insert_with(|| ExtensionList {
                extension: Vec::new(),
            })
            .extension
            .push(Extension { key, value });
        self
    }

    /// Converts the envelope into a JSON value ready to be dispatched.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl Error {
    /// Creates the error raised when no callback endpoint is registered.
    pub fn routing_unavailable(
        callback_type: &str,
        resource: &str,
        request_id: Option<&str>,
        participant: &str,
    ) -> Self {
        Error::RoutingUnavailable {
            message: format!(
                "No {} endpoint found for {} {} for {}",
                callback_type,
                resource,
                request_id.unwrap_or_default(),
                participant
            ),
            participant: participant.to_string(),
        }
    }

    /// Creates a transport failure with an optional cause.
    pub fn transport(message: impl Into<String>, cause: Option<String>) -> Self {
        Error::Transport {
            message: message.into(),
            cause,
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RoutingUnavailable { .. } => ErrorKind::RoutingUnavailable,
            Error::Transport { .. } => ErrorKind::TransportFailure,
            Error::Compensation { .. } => ErrorKind::CompensationFailure,
            Error::InvalidUrl(_)
            | Error::Resolver(_)
            | Error::Serialization(_)
            | Error::Configuration(_) => ErrorKind::Internal,
        }
    }

    /// Returns the FSPIOP error code for this error.
    pub fn api_error_code(&self) -> ApiErrorCode {
        match self {
            Error::RoutingUnavailable { .. } => ApiErrorCode::DESTINATION_FSP_ERROR,
            Error::Transport { .. } => ApiErrorCode::DESTINATION_COMMUNICATION_ERROR,
            Error::Compensation { failure, .. } => failure.api_error_code(),
            Error::InvalidUrl(_) => ApiErrorCode::VALIDATION_ERROR,
            Error::Resolver(_) | Error::Serialization(_) | Error::Configuration(_) => {
                ApiErrorCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the primary failure. For compensation failures this is the error
    /// that triggered compensation, for every other error it is `self`.
    pub fn original(&self) -> &Error {
        match self {
            Error::Compensation { original, .. } => original.original(),
            other => other,
        }
    }

    /// Transport level detail, if any.
    pub fn cause(&self) -> Option<&str> {
        match self {
            Error::Transport { cause, .. } => cause.as_deref(),
            Error::Compensation { failure, .. } => failure.cause(),
            _ => None,
        }
    }

    /// Builds the standardized error envelope for this error.
    pub fn to_api_error_object(&self, config: &ErrorHandlingConfig) -> ApiErrorObject {
        let envelope = ApiErrorObject::new(self.api_error_code(), &self.to_string());
        match self.cause() {
            Some(cause) if config.include_cause_extension => {
                envelope.with_extension("cause", cause, config.truncate_extensions)
            }
            _ => envelope,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
