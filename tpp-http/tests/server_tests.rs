use mockito::Matcher;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tpp_http::{HttpEvent, TppHttpConfig, TppHttpServer};
use tpp_relay::{RelayConfig, FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE};

/// Relay settings with static endpoints for the given participants.
fn relay_config(endpoints: &[(&str, String)]) -> RelayConfig {
    let mut config = RelayConfig {
        request_timeout_secs: 2,
        ..RelayConfig::default()
    };
    for (participant, url) in endpoints {
        config.endpoints.insert(
            participant.to_string(),
            HashMap::from([(FSPIOP_CALLBACK_URL_TPP_REQ_SERVICE.to_string(), url.clone())]),
        );
    }
    config
}

async fn start_server(relay: RelayConfig) -> (TppHttpServer, String) {
    let config = TppHttpConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        relay,
        event_logger: None,
    };
    let mut server = TppHttpServer::new(config).expect("valid config");
    server.start().await.expect("Server should start");
    let base = format!("http://{}", server.local_addr().expect("bound address"));
    (server, base)
}

fn fspiop_request(builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    builder
        .header("FSPIOP-Source", "pispA")
        .header("FSPIOP-Destination", "dfspA")
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(2))
}

async fn wait_until_matched(mock: &mockito::Mock) {
    for _ in 0..50 {
        if mock.matched_async().await {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("mock was never called");
}

#[tokio::test]
async fn test_server_startup() {
    let (mut server, _) = start_server(RelayConfig::default()).await;
    assert!(server.local_addr().is_some());

    server.stop().await.expect("Server should stop");
    assert!(server.local_addr().is_none());
}

#[tokio::test]
async fn test_invalid_relay_config_is_rejected() {
    let config = TppHttpConfig {
        relay: RelayConfig {
            request_timeout_secs: 0,
            ..RelayConfig::default()
        },
        ..TppHttpConfig::default()
    };

    assert!(TppHttpServer::new(config).is_err());
}

#[tokio::test]
async fn test_health_endpoint() {
    let (mut server, base) = start_server(RelayConfig::default()).await;

    let response = reqwest::get(format!("{}/health", base))
        .await
        .expect("Health check request should succeed");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("Response should be valid JSON");
    assert_eq!(body["status"], "OK");

    server.stop().await.expect("Server should stop");
}

#[tokio::test]
async fn test_unknown_route_returns_error_envelope() {
    let (mut server, base) = start_server(RelayConfig::default()).await;

    let response = reqwest::get(format!("{}/consents/abcd", base)).await.unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errorInformation"]["errorCode"], "3002");

    server.stop().await.expect("Server should stop");
}

#[tokio::test]
async fn test_wrong_method_returns_error_envelope() {
    let (mut server, base) = start_server(RelayConfig::default()).await;

    let response = reqwest::Client::new()
        .delete(format!("{}/tppAccounts/abcd", base))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errorInformation"]["errorCode"], "3000");

    server.stop().await.expect("Server should stop");
}

#[tokio::test]
async fn test_get_on_accounts_error_route_is_not_a_lookup() {
    let mut dfsp = mockito::Server::new_async().await;
    let lookup = dfsp
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let (mut server, base) = start_server(relay_config(&[("dfspA", dfsp.url())])).await;

    let response =
        fspiop_request(reqwest::Client::new().get(format!("{}/tppAccounts/abcd/error", base)))
            .send()
            .await
            .unwrap();

    assert_eq!(response.status(), 405);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errorInformation"]["errorCode"], "3000");

    server.stop().await.expect("Server should stop");
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_missing_fspiop_headers() {
    let (mut server, base) = start_server(RelayConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/tppAccountRequest", base))
        .json(&json!({ "accountRequestId": "abcd" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errorInformation"]["errorCode"], "3102");
    assert!(body["errorInformation"]["errorDescription"]
        .as_str()
        .unwrap()
        .contains("fspiop-source"));

    server.stop().await.expect("Server should stop");
}

#[tokio::test]
async fn test_invalid_json_body() {
    let (mut server, base) = start_server(RelayConfig::default()).await;

    let response = fspiop_request(reqwest::Client::new().put(format!("{}/tppAccounts/abcd", base)))
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errorInformation"]["errorCode"], "3100");

    server.stop().await.expect("Server should stop");
}

#[tokio::test]
async fn test_put_accounts_is_relayed_to_destination() {
    let mut dfsp = mockito::Server::new_async().await;
    let forwarded = dfsp
        .mock("PUT", "/tppAccounts/abcd")
        .match_header("fspiop-source", "pispA")
        .match_header("fspiop-destination", "dfspA")
        .match_body(Matcher::Json(json!({ "accounts": [{ "accountNickname": "Chequing" }] })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let (mut server, base) = start_server(relay_config(&[("dfspA", dfsp.url())])).await;

    let response = fspiop_request(reqwest::Client::new().put(format!("{}/tppAccounts/abcd", base)))
        .json(&json!({ "accounts": [{ "accountNickname": "Chequing" }] }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().is_empty());

    wait_until_matched(&forwarded).await;
    server.stop().await.expect("Server should stop");
}

#[tokio::test]
async fn test_get_accounts_is_relayed_without_body() {
    let mut dfsp = mockito::Server::new_async().await;
    let forwarded = dfsp
        .mock("GET", "/tppAccounts/abcd/1234")
        .match_header("fspiop-destination", "dfspA")
        .match_body(Matcher::Exact(String::new()))
        .with_status(202)
        .create_async()
        .await;

    let (mut server, base) = start_server(relay_config(&[("dfspA", dfsp.url())])).await;

    let response =
        fspiop_request(reqwest::Client::new().get(format!("{}/tppAccounts/abcd/1234", base)))
            .send()
            .await
            .unwrap();

    assert_eq!(response.status(), 202);

    wait_until_matched(&forwarded).await;
    server.stop().await.expect("Server should stop");
}

#[tokio::test]
async fn test_post_account_request_is_accepted() {
    let mut dfsp = mockito::Server::new_async().await;
    let forwarded = dfsp
        .mock("POST", "/tppAccountRequest")
        .match_body(Matcher::PartialJson(json!({ "accountRequestId": "abcd" })))
        .with_status(202)
        .create_async()
        .await;

    let (mut server, base) = start_server(relay_config(&[("dfspA", dfsp.url())])).await;

    let response =
        fspiop_request(reqwest::Client::new().post(format!("{}/tppAccountRequest", base)))
            .json(&json!({ "accountRequestId": "abcd", "userId": "username1234" }))
            .send()
            .await
            .unwrap();

    assert_eq!(response.status(), 202);

    wait_until_matched(&forwarded).await;
    server.stop().await.expect("Server should stop");
}

#[tokio::test]
async fn test_inbound_error_is_relayed_to_destination() {
    let mut dfsp = mockito::Server::new_async().await;
    let relayed = dfsp
        .mock("PUT", "/tppAccountRequest/abcd/error")
        .match_body(Matcher::PartialJson(json!({
            "errorInformation": { "errorCode": "6000" }
        })))
        .with_status(200)
        .create_async()
        .await;

    let (mut server, base) = start_server(relay_config(&[("dfspA", dfsp.url())])).await;

    let response = fspiop_request(
        reqwest::Client::new().put(format!("{}/tppAccountRequest/abcd/error", base)),
    )
    .json(&json!({
        "errorInformation": { "errorCode": "6000", "errorDescription": "Generic thirdparty error" }
    }))
    .send()
    .await
    .unwrap();

    assert_eq!(response.status(), 200);

    wait_until_matched(&relayed).await;
    server.stop().await.expect("Server should stop");
}

#[tokio::test]
async fn test_unroutable_destination_sends_error_callback_to_source() {
    let mut pisp = mockito::Server::new_async().await;
    let error_callback = pisp
        .mock("PUT", "/tppAccounts/abcd/error")
        .match_header("fspiop-source", "pispA")
        .match_header("fspiop-destination", "dfspA")
        .match_body(Matcher::PartialJson(json!({
            "errorInformation": { "errorCode": "3201" }
        })))
        .with_status(200)
        .create_async()
        .await;

    // dfspA has no registered endpoint
    let (mut server, base) = start_server(relay_config(&[("pispA", pisp.url())])).await;
    let mut events = server.event_bus().subscribe_channel();

    let response = fspiop_request(reqwest::Client::new().put(format!("{}/tppAccounts/abcd", base)))
        .json(&json!({ "accounts": [] }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    wait_until_matched(&error_callback).await;

    let failure = timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(HttpEvent::RelayFailed {
                    operation,
                    request_id,
                    error_code,
                    ..
                }) => break (operation, request_id, error_code),
                Ok(_) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("relay failure should be published");

    assert_eq!(failure.0, "UpdateAccountsByUserId");
    assert_eq!(failure.1.as_deref(), Some("abcd"));
    assert_eq!(failure.2, "3201");

    server.stop().await.expect("Server should stop");
}
