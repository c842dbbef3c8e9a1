//! Endpoint resolution against the switch participant directory.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::EndpointResolver;
use crate::error::{Error, Result};

/// Default timeout for directory lookups in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One registered endpoint as returned by `GET /participants/{id}/endpoints`.
#[derive(Debug, Deserialize)]
struct ParticipantEndpoint {
    #[serde(rename = "type")]
    type_: String,
    value: String,
}

/// Resolves endpoints by querying the switch on every call.
#[derive(Debug, Clone)]
pub struct SwitchEndpointResolver {
    client: Client,
}

impl SwitchEndpointResolver {
    /// Create a resolver with the given lookup timeout.
    pub fn new(timeout_secs: Option<u64>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(
                timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    fn endpoints_url(switch_url: &str, participant_id: &str) -> String {
        format!(
            "{}/participants/{}/endpoints",
            switch_url.trim_end_matches('/'),
            percent_encoding::utf8_percent_encode(
                participant_id,
                percent_encoding::NON_ALPHANUMERIC
            )
        )
    }
}

impl Default for SwitchEndpointResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl EndpointResolver for SwitchEndpointResolver {
    async fn resolve(
        &self,
        switch_url: &str,
        participant_id: &str,
        callback_type: &str,
    ) -> Result<Option<String>> {
        let url = Self::endpoints_url(switch_url, participant_id);
        debug!("Looking up {} endpoints at {}", participant_id, url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::Resolver(format!("Failed to query {}: {}", url, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Resolver(format!(
                    "Endpoint lookup for {} failed with status {}: {}",
                    participant_id, status, body
                )));
            }
            _ => {}
        }

        let endpoints: Vec<ParticipantEndpoint> = response.json().await.map_err(|e| {
            Error::Resolver(format!(
                "Invalid endpoint list for {}: {}",
                participant_id, e
            ))
        })?;

        Ok(endpoints
            .into_iter()
            .find(|endpoint| endpoint.type_ == callback_type)
            .map(|endpoint| endpoint.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_resolves_matching_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/participants/dfsp2/endpoints")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"type": "FSPIOP_CALLBACK_URL_QUOTES", "value": "http://dfsp2:4000/quotes"},
                    {"type": "FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE", "value": "http://dfsp2:4000"}
                ]"#,
            )
            .expect(1)
            .create_async()
            .await;

        let resolver = SwitchEndpointResolver::default();
        let endpoint = resolver
            .resolve(&server.url(), "dfsp2", FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE)
            .await
            .unwrap();

        assert_eq!(endpoint.as_deref(), Some("http://dfsp2:4000"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_registration_is_absent() {
        let mut server = mockito::Server::new_async().await;
        let _empty = server
            .mock("GET", "/participants/dfsp1/endpoints")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let _unknown = server
            .mock("GET", "/participants/ghost/endpoints")
            .with_status(404)
            .create_async()
            .await;

        let resolver = SwitchEndpointResolver::default();
        let empty = resolver
            .resolve(&server.url(), "dfsp1", FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE)
            .await
            .unwrap();
        assert!(empty.is_none());

        let unknown = resolver
            .resolve(&server.url(), "ghost", FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE)
            .await
            .unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_directory_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _failing = server
            .mock("GET", "/participants/dfsp2/endpoints")
            .with_status(500)
            .with_body("database unavailable")
            .create_async()
            .await;

        let resolver = SwitchEndpointResolver::default();
        let result = resolver
            .resolve(&server.url(), "dfsp2", FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE)
            .await;

        assert_matches!(result, Err(Error::Resolver(msg)) if msg.contains("database unavailable"));
    }

    #[test]
    fn test_endpoints_url() {
        assert_eq!(
            SwitchEndpointResolver::endpoints_url("http://switch:3001/", "dfsp 1"),
            "http://switch:3001/participants/dfsp%201/endpoints"
        );
    }
}
