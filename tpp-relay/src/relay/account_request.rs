//! Relay for `/tppAccountRequest` messages.

use std::sync::Arc;

use super::{ErrorCallback, ErrorCompensator, ForwardRequest, Relay, ResourceFamily};
use crate::config::RelayConfig;
use crate::dispatcher::Dispatcher;
use crate::endpoint::{templates, EndpointResolver, FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE};
use crate::error::Result;

/// The account request family.
pub const TPP_ACCOUNT_REQUEST: ResourceFamily = ResourceFamily {
    resource: "tppAccountRequest",
    id_field: "accountRequestId",
    callback_type: FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE,
    error_callback_type: FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE,
    error_path: templates::TP_ACCOUNT_REQUEST_PUT_ERROR,
    forward_span: "forwardTppAccountRequest",
    error_span: "forwardTppAccountRequestError",
};

/// Forwards account requests and their callbacks between PISP and DFSP.
#[derive(Debug, Clone)]
pub struct TppAccountRequestRelay {
    relay: Relay,
}

impl TppAccountRequestRelay {
    pub fn new(
        config: &RelayConfig,
        resolver: Arc<dyn EndpointResolver>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            relay: Relay::new(TPP_ACCOUNT_REQUEST, config, resolver, dispatcher),
        }
    }

    /// Replaces the error compensator.
    pub fn with_compensator(mut self, compensator: Arc<dyn ErrorCompensator>) -> Self {
        self.relay = self.relay.with_compensator(compensator);
        self
    }

    /// Forwards a create, lookup or update of an account request.
    pub async fn forward_tpp_account_request(&self, request: ForwardRequest) -> Result<bool> {
        self.relay.forward(request).await
    }

    /// Delivers an account request error callback.
    pub async fn forward_tpp_account_request_error(&self, callback: ErrorCallback) -> Result<bool> {
        self.relay.forward_error(callback).await
    }
}
