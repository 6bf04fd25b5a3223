//! Runs `ChatClient` against a throwaway HTTP responder on localhost.

use carechat_core::{ChatClient, ChatError, ChatTransport, Conversation, Draft, FAILURE_NOTICE};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn client_for(base_url: &str) -> ChatClient {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    ChatClient::with_client(client, base_url)
}

struct CapturedRequest {
    head: String,
    body: String,
}

/// Serves exactly one request with the given status line and body, and hands
/// back what the client sent.
async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let (head, request_body) = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let head = text[..split].to_string();
                let content_length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let body_start = split + 4;
                if buf.len() >= body_start + content_length {
                    let request_body = String::from_utf8_lossy(&buf[body_start..body_start + content_length]).to_string();
                    break (head, request_body);
                }
            }
            if n == 0 {
                panic!("client closed the connection early");
            }
        };

        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(CapturedRequest { head, body: request_body });
    });

    (base_url, rx)
}

#[tokio::test]
async fn posts_json_message_to_chat_path() {
    let (base_url, captured) = serve_once("200 OK", r#"{"response":"hi"}"#).await;
    let client = client_for(&format!("{}/", base_url));

    let reply = client.send_message("こんにちは").await.unwrap();
    assert_eq!(reply, "hi");

    let request = captured.await.unwrap();
    let request_line = request.head.lines().next().unwrap();
    assert_eq!(request_line, "POST /chat HTTP/1.1");
    assert!(request
        .head
        .to_ascii_lowercase()
        .contains("content-type: application/json"));

    let body: Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body, serde_json::json!({"message": "こんにちは"}));
}

#[tokio::test]
async fn stringifies_reply_without_response_field() {
    let (base_url, _captured) = serve_once("200 OK", r#"{"foo":1}"#).await;
    let client = client_for(&base_url);

    assert_eq!(client.send_message("x").await.unwrap(), r#"{"foo":1}"#);
}

#[tokio::test]
async fn stringified_reply_keeps_server_key_order() {
    let body = r#"{"status":"queued","detail":"retry later","position":2}"#;
    let (base_url, _captured) = serve_once("200 OK", body).await;
    let client = client_for(&base_url);

    assert_eq!(client.send_message("x").await.unwrap(), body);
}

#[tokio::test]
async fn non_json_reply_is_shown_raw() {
    let (base_url, _captured) = serve_once("200 OK", "plain text").await;
    let client = client_for(&base_url);

    assert_eq!(client.send_message("x").await.unwrap(), "plain text");
}

#[tokio::test]
async fn error_status_is_reported() {
    let (base_url, _captured) = serve_once("500 Internal Server Error", "boom").await;
    let client = client_for(&base_url);

    match client.send_message("x").await {
        Err(ChatError::Status { status, body, .. }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = client_for(&base_url);
    let result = client.send_message("x").await;
    assert!(matches!(result, Err(ChatError::Transport(_))));
}

#[tokio::test]
async fn conversation_round_trip_over_http() {
    let (base_url, captured) = serve_once("200 OK", r#"{"response":"どんな時に？"}"#).await;
    let client = client_for(&base_url);
    let mut conversation = Conversation::with_greeting();
    conversation.draft = Draft::free("うるさくてキレた");

    conversation.send(&client).await.unwrap();

    assert_eq!(conversation.messages().len(), 3);
    assert_eq!(conversation.last_reply().unwrap().content, "どんな時に？");
    assert!(captured.await.unwrap().body.contains("うるさくてキレた"));
}

#[tokio::test]
async fn conversation_keeps_log_on_server_error() {
    let (base_url, _captured) = serve_once("503 Service Unavailable", "").await;
    let client = client_for(&base_url);
    let mut conversation = Conversation::new();
    conversation.draft = Draft::free("hello");

    conversation.send(&client).await.unwrap();

    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(conversation.error(), Some(FAILURE_NOTICE));
    assert!(!conversation.is_in_flight());
}
