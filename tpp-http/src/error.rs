//! Error handling for the TPP HTTP gateway.
//!
//! Errors raised while accepting an inbound request are answered with an
//! FSPIOP error envelope. Failures of the relay itself happen after the
//! response has been sent and never pass through here.

use thiserror::Error;
use tpp_relay::{ApiErrorCode, ApiErrorObject};
use warp::http::StatusCode;
use warp::Reply;

/// Result type for tpp-http operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the TPP HTTP gateway.
#[derive(Error, Debug)]
pub enum Error {
    /// A required header is missing.
    #[error("Missing mandatory header: {0}")]
    MissingHeader(String),

    /// The request body could not be accepted.
    #[error("{0}")]
    Validation(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// HTTP server error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Relay error.
    #[error("Relay error: {0}")]
    Relay(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the HTTP status code that should be used for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingHeader(_) | Error::Validation(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Relay(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Http(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the FSPIOP error code reported for this error.
    pub fn api_error_code(&self) -> ApiErrorCode {
        match self {
            Error::MissingHeader(_) => ApiErrorCode::MISSING_ELEMENT,
            Error::Validation(_) | Error::Json(_) => ApiErrorCode::VALIDATION_ERROR,
            Error::Relay(_) | Error::Config(_) | Error::Http(_) | Error::Io(_) => {
                ApiErrorCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Creates an error response for this error.
    pub fn to_response(&self) -> warp::reply::Response {
        error_envelope_response(self.status_code(), self.api_error_code(), &self.to_string())
    }
}

/// Builds a reply carrying an FSPIOP error envelope.
pub fn error_envelope_response(
    status: StatusCode,
    code: ApiErrorCode,
    message: &str,
) -> warp::reply::Response {
    let envelope = ApiErrorObject::new(code, message);
    warp::reply::with_status(warp::reply::json(&envelope), status).into_response()
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<tpp_relay::Error> for Error {
    fn from(err: tpp_relay::Error) -> Self {
        match err {
            tpp_relay::Error::Configuration(message) => Error::Config(message),
            other => Error::Relay(other.to_string()),
        }
    }
}

impl warp::reject::Reject for Error {}
