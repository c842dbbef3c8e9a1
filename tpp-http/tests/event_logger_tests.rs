use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::tempdir;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tpp_http::event::{EventLoggerConfig, EventSubscriber, HttpEvent, LogDestination};
use tpp_http::{TppHttpConfig, TppHttpServer};

#[tokio::test(flavor = "multi_thread")]
async fn test_server_events() {
    struct TestSubscriber {
        events: Arc<Mutex<Vec<HttpEvent>>>,
    }

    #[async_trait::async_trait]
    impl EventSubscriber for TestSubscriber {
        async fn handle_event(&self, event: HttpEvent) {
            self.events.lock().await.push(event);
        }
    }

    let config = TppHttpConfig {
        port: 0,
        event_logger: None,
        ..TppHttpConfig::default()
    };
    let mut server = TppHttpServer::new(config).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    server
        .event_bus()
        .subscribe(Arc::new(TestSubscriber {
            events: events.clone(),
        }))
        .await;

    server.start().await.unwrap();
    sleep(Duration::from_millis(100)).await;
    server.stop().await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let captured_events = events.lock().await;
    assert!(captured_events.len() >= 2);

    match &captured_events[0] {
        HttpEvent::ServerStarted { address } => {
            assert!(address.starts_with("127.0.0.1:"));
        }
        _ => panic!("First event should be ServerStarted"),
    }
    match &captured_events[captured_events.len() - 1] {
        HttpEvent::ServerStopped => {}
        _ => panic!("Last event should be ServerStopped"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_event_logging() {
    let temp_dir = tempdir().unwrap();
    let log_path = temp_dir.path().join("logs").join("tpp-http.log");

    let config = TppHttpConfig {
        port: 0,
        event_logger: Some(EventLoggerConfig {
            destination: LogDestination::File {
                path: log_path.to_string_lossy().to_string(),
            },
            structured: true,
            log_level: tracing::Level::INFO,
        }),
        ..TppHttpConfig::default()
    };
    let mut server = TppHttpServer::new(config).unwrap();
    server.start().await.unwrap();
    let addr = server.local_addr().unwrap();

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), 200);

    server.stop().await.unwrap();
    sleep(Duration::from_millis(200)).await;

    let contents = fs::read_to_string(&log_path).unwrap();
    let entries: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let event_types: Vec<&str> = entries
        .iter()
        .map(|entry| entry["event_type"].as_str().unwrap())
        .collect();

    assert_eq!(event_types.first(), Some(&"server_started"));
    assert!(event_types.contains(&"request_received"));
    assert!(event_types.contains(&"response_sent"));
    assert_eq!(event_types.last(), Some(&"server_stopped"));

    let request = entries
        .iter()
        .find(|entry| entry["event_type"] == "request_received")
        .unwrap();
    assert_eq!(request["data"]["path"], "/health");
    assert!(entries.iter().all(|entry| entry["timestamp"].is_string()));
}
