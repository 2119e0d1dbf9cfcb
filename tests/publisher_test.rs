// ABOUTME: KreezalidClient tests against a one-shot local HTTP responder
// ABOUTME: Checks the request shape and how responses map to PublishOutcome

use kreezalid_migrator::config::{ApiConfig, TlsPolicy};
use kreezalid_migrator::entity::EntityKind;
use kreezalid_migrator::models::RemoteId;
use kreezalid_migrator::publisher::{
    basic_auth_header, KreezalidClient, PublishError, PublishOutcome, Publisher,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(headers: &str) -> usize {
    headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Accept one connection, answer with `status` and `body`, and hand back the raw request.
async fn respond_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = header_end(&buf) {
                let headers = String::from_utf8_lossy(&buf[..end]).to_string();
                if buf.len() >= end + 4 + content_length(&headers) {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf).to_string()
    });

    (format!("http://{}/api", addr), handle)
}

fn client(endpoint: &str) -> KreezalidClient {
    let api = ApiConfig::new(
        endpoint,
        "shop-admin".to_string(),
        "hunter2".to_string(),
        TlsPolicy::Verify,
    )
    .unwrap();
    KreezalidClient::new(&api).unwrap()
}

#[tokio::test]
async fn created_response_yields_remote_id() {
    let (endpoint, server) = respond_once("201 Created", r#"{"id": 555, "email": "a@x.com"}"#).await;

    let outcome = client(&endpoint)
        .publish(EntityKind::User, &json!({"email": "a@x.com", "status": "enabled"}))
        .await;
    assert_eq!(outcome, PublishOutcome::Created(RemoteId(555)));

    let request = server.await.unwrap();
    let lowered = request.to_lowercase();
    assert!(request.starts_with("POST /api/users "));
    assert!(lowered.contains(&format!(
        "authorization: {}",
        basic_auth_header("shop-admin", "hunter2").to_lowercase()
    )));
    assert!(lowered.contains("content-type: application/json"));
    assert!(request.contains(r#""email":"a@x.com""#));
}

#[tokio::test]
async fn listing_endpoint_path() {
    let (endpoint, server) = respond_once("200 OK", r#"{"id": "901"}"#).await;

    let outcome = client(&endpoint)
        .publish(EntityKind::Listing, &json!({"external_id": 40}))
        .await;
    assert_eq!(outcome, PublishOutcome::Created(RemoteId(901)));
    assert!(server.await.unwrap().starts_with("POST /api/listings "));
}

#[tokio::test]
async fn error_status_is_a_failure() {
    let (endpoint, server) =
        respond_once("422 Unprocessable Entity", r#"{"error": "email already taken"}"#).await;

    let outcome = client(&endpoint)
        .publish(EntityKind::User, &json!({"email": "a@x.com"}))
        .await;
    match outcome {
        PublishOutcome::Failed(PublishError::Status { status, body }) => {
            assert_eq!(status, 422);
            assert!(body.contains("email already taken"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn success_without_id_is_a_failure() {
    let (endpoint, server) = respond_once("200 OK", r#"{"status": "queued"}"#).await;

    let outcome = client(&endpoint)
        .publish(EntityKind::Category, &json!({"external_id": 3}))
        .await;
    assert!(matches!(
        outcome,
        PublishOutcome::Failed(PublishError::MissingId(_))
    ));
    assert!(server.await.unwrap().starts_with("POST /api/categories "));
}

#[tokio::test]
async fn non_json_success_is_a_failure() {
    let (endpoint, server) = respond_once("200 OK", "<html>maintenance</html>").await;

    let outcome = client(&endpoint)
        .publish(EntityKind::User, &json!({}))
        .await;
    assert!(matches!(
        outcome,
        PublishOutcome::Failed(PublishError::Decode(_))
    ));
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_api_is_a_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let outcome = client(&format!("http://{}/api", addr))
        .publish(EntityKind::User, &json!({}))
        .await;
    assert!(matches!(
        outcome,
        PublishOutcome::Failed(PublishError::Transport(_))
    ));
}

#[tokio::test]
async fn zero_id_is_not_an_identifier() {
    let (endpoint, server) = respond_once("201 Created", r#"{"id": 0}"#).await;

    let outcome = client(&endpoint)
        .publish(EntityKind::Listing, &json!({"external_id": 41}))
        .await;
    assert!(matches!(
        outcome,
        PublishOutcome::Failed(PublishError::MissingId(_))
    ));
    server.await.unwrap();
}
