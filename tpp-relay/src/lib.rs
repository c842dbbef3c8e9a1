//! # TPP Relay
//!
//! Forwarding core for third-party account linking messages exchanged between
//! switch participants (PISPs and DFSPs).
//!
//! ## Overview
//!
//! Every inbound message is relayed in one unit of work:
//!
//! - the destination participant's callback URL is resolved through an
//!   [`EndpointResolver`]
//! - the message path is rendered against that URL with the request id and,
//!   for account lookups, the signed challenge
//! - the message is sent by a [`Dispatcher`]
//!
//! If any step fails, an FSPIOP error envelope is built from the failure and
//! delivered to the participant that sent the message. That error callback is
//! attempted once and never compensated itself. The whole unit of work runs in
//! a child of the caller's trace [`Span`], which is finished exactly once.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use tpp_relay::{ForwardRequest, MessageHeaders, PathParams, RelayConfig, RestMethod, TppRelay};
//! use tpp_relay::endpoint::templates;
//!
//! async fn example() -> tpp_relay::Result<()> {
//!     let relay = TppRelay::new(RelayConfig::default())?;
//!
//!     let headers = MessageHeaders::new()
//!         .with("FSPIOP-Source", "pispA")
//!         .with("FSPIOP-Destination", "dfspA");
//!     let request = ForwardRequest::new(templates::TPP_ACCOUNTS_GET, headers, RestMethod::Get)
//!         .with_params(PathParams::with_id("abcd").signed_challenge("1234"));
//!
//!     relay.accounts().forward_tpp_accounts(request).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod headers;
pub mod relay;
pub mod span;
pub mod template;

use std::sync::Arc;
use tracing::info;

pub use config::{ErrorHandlingConfig, RelayConfig};
pub use dispatcher::{
    DispatchRequest, DispatchResponse, Dispatcher, HttpDispatcher, ResponseType, RestMethod,
};
pub use endpoint::{
    EndpointResolver, StaticEndpointResolver, SwitchEndpointResolver,
    FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE,
};
pub use error::{ApiErrorCode, ApiErrorObject, Error, ErrorKind, Result};
pub use headers::MessageHeaders;
pub use relay::{
    CallbackCompensator, ErrorCallback, ErrorCompensator, ForwardRequest, Relay, ResourceFamily,
    TppAccountRequestRelay, TppAccountsRelay,
};
pub use span::{Span, TracingSpan};
pub use template::PathParams;

/// Both resource family relays sharing one resolver and dispatcher.
#[derive(Debug, Clone)]
pub struct TppRelay {
    config: RelayConfig,
    account_requests: TppAccountRequestRelay,
    accounts: TppAccountsRelay,
}

impl TppRelay {
    /// Creates a relay from configuration.
    ///
    /// Static endpoints in the configuration replace switch lookups.
    pub fn new(config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let resolver: Arc<dyn EndpointResolver> = if config.endpoints.is_empty() {
            Arc::new(SwitchEndpointResolver::new(Some(config.request_timeout_secs)))
        } else {
            let resolver = StaticEndpointResolver::new();
            for (participant, types) in &config.endpoints {
                for (callback_type, url) in types {
                    resolver.register(participant.as_str(), callback_type.as_str(), url.as_str());
                }
            }
            info!("Using {} static endpoint registrations", config.endpoints.len());
            Arc::new(resolver)
        };
        let dispatcher = Arc::new(HttpDispatcher::new(Some(config.request_timeout_secs)));

        Ok(Self::with_components(config, resolver, dispatcher))
    }

    /// Creates a relay with the given collaborators.
    pub fn with_components(
        config: RelayConfig,
        resolver: Arc<dyn EndpointResolver>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let account_requests =
            TppAccountRequestRelay::new(&config, resolver.clone(), dispatcher.clone());
        let accounts = TppAccountsRelay::new(&config, resolver, dispatcher);
        Self {
            config,
            account_requests,
            accounts,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Relay for `/tppAccountRequest` messages.
    pub fn account_requests(&self) -> &TppAccountRequestRelay {
        &self.account_requests
    }

    /// Relay for `/tppAccounts` messages.
    pub fn accounts(&self) -> &TppAccountsRelay {
        &self.accounts
    }
}
