//! HTTP gateway for third-party account requests.
//!
//! This crate exposes the `tppAccountRequest` and `tppAccounts` resources over
//! HTTP and hands every inbound request to the [`tpp_relay`] crate, which
//! forwards it to the destination participant.
//!
//! # Request Flow
//!
//! 1. **HTTP Request**: A participant calls one of the resource routes with
//!    `FSPIOP-Source` and `FSPIOP-Destination` headers
//! 2. **Validation**: Missing party headers or an unparseable body are answered
//!    with an FSPIOP error envelope
//! 3. **Acknowledgement**: The gateway answers `202 Accepted` for POST and GET,
//!    `200 OK` for PUT, before the relay runs
//! 4. **Relay**: A detached task resolves the destination endpoint and forwards
//!    the request, or sends an error callback to the source when that fails
//!
//! # Key Components
//!
//! - **Handler**: Per-operation validation, span setup and detached relaying
//! - **Server**: Warp-based HTTP server with graceful shutdown
//! - **Event Bus**: Server and relay failure events with a pluggable logger
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use tpp_http::{TppHttpConfig, TppHttpServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = TppHttpConfig::default();
//!     config.relay.switch_endpoint = "http://central-ledger:3001".to_string();
//!
//!     let mut server = TppHttpServer::new(config)?;
//!     server.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

// Public modules
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod server;

// Re-exports
pub use config::TppHttpConfig;
pub use error::{Error, Result};
pub use event::{EventBus, EventLogger, EventLoggerConfig, HttpEvent, LogDestination};
pub use handler::Operation;
pub use server::TppHttpServer;
