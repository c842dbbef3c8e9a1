//! Relay for `/tppAccounts` messages.
//!
//! Account lookups carry a signed challenge as a second path segment; it is
//! only used when rendering the outbound URL.

use std::sync::Arc;

use super::{ErrorCallback, ErrorCompensator, ForwardRequest, Relay, ResourceFamily};
use crate::config::RelayConfig;
use crate::dispatcher::Dispatcher;
use crate::endpoint::{templates, EndpointResolver, FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE};
use crate::error::Result;

/// The accounts family.
pub const TPP_ACCOUNTS: ResourceFamily = ResourceFamily {
    resource: "tppAccounts",
    id_field: "accountRequestId",
    callback_type: FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE,
    error_callback_type: FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE,
    error_path: templates::TPP_ACCOUNTS_PUT_ERROR,
    forward_span: "forwardTppAccounts",
    error_span: "forwardTppAccountsError",
};

/// Forwards account lookups and their callbacks.
#[derive(Debug, Clone)]
pub struct TppAccountsRelay {
    relay: Relay,
}

impl TppAccountsRelay {
    pub fn new(
        config: &RelayConfig,
        resolver: Arc<dyn EndpointResolver>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            relay: Relay::new(TPP_ACCOUNTS, config, resolver, dispatcher),
        }
    }

    pub fn with_compensator(mut self, compensator: Arc<dyn ErrorCompensator>) -> Self {
        self.relay = self.relay.with_compensator(compensator);
        self
    }

    pub async fn forward_tpp_accounts(&self, request: ForwardRequest) -> Result<bool> {
        self.relay.forward(request).await
    }

    pub async fn forward_tpp_accounts_error(&self, callback: ErrorCallback) -> Result<bool> {
        self.relay.forward_error(callback).await
    }
}
