//! Participant endpoint resolution.
//!
//! The relay never stores callback URLs itself. Every forward asks an
//! [`EndpointResolver`] for the participant's registered URL, and an absent
//! registration is a normal answer rather than an error.

pub mod switch;

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt::Debug;

use crate::error::Result;

pub use switch::SwitchEndpointResolver;

/// Callback type under which participants register their third-party request service.
pub const FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE: &str = "FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE";

/// Path templates appended to a resolved callback URL.
pub mod templates {
    pub const TP_ACCOUNT_REQUEST_POST: &str = "/tppAccountRequest";
    pub const TP_ACCOUNT_REQUEST_GET: &str = "/tppAccountRequest/{{ID}}";
    pub const TP_ACCOUNT_REQUEST_PUT: &str = "/tppAccountRequest/{{ID}}";
    pub const TP_ACCOUNT_REQUEST_PUT_ERROR: &str = "/tppAccountRequest/{{ID}}/error";
    pub const TPP_ACCOUNTS_GET: &str = "/tppAccounts/{{ID}}/{{SignedChallenge}}";
    pub const TPP_ACCOUNTS_PUT: &str = "/tppAccounts/{{ID}}";
    pub const TPP_ACCOUNTS_PUT_ERROR: &str = "/tppAccounts/{{ID}}/error";
}

/// Looks up the callback URL a participant registered for a callback type.
#[async_trait]
pub trait EndpointResolver: Send + Sync + Debug {
    /// Resolve the URL for `participant_id` and `callback_type`.
    ///
    /// Returns `Ok(None)` when the participant has no such registration.
    async fn resolve(
        &self,
        switch_url: &str,
        participant_id: &str,
        callback_type: &str,
    ) -> Result<Option<String>>;
}

/// Resolver backed by an in-memory registry.
#[derive(Debug, Default)]
pub struct StaticEndpointResolver {
    endpoints: DashMap<(String, String), String>,
}

impl StaticEndpointResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the URL for a participant and callback type
    pub fn register(
        &self,
        participant_id: impl Into<String>,
        callback_type: impl Into<String>,
        url: impl Into<String>,
    ) {
        self.endpoints
            .insert((participant_id.into(), callback_type.into()), url.into());
    }

    /// Remove a registration
    pub fn unregister(&self, participant_id: &str, callback_type: &str) {
        self.endpoints
            .remove(&(participant_id.to_string(), callback_type.to_string()));
    }
}

#[async_trait]
impl EndpointResolver for StaticEndpointResolver {
    async fn resolve(
        &self,
        _switch_url: &str,
        participant_id: &str,
        callback_type: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .endpoints
            .get(&(participant_id.to_string(), callback_type.to_string()))
            .map(|entry| entry.value().clone()))
    }
}
