use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::{body_partial_json, header, method, path};

use testsmith_core::{AnthropicEngine, EngineConfig, EngineError, Language, LlmEngine};

async fn engine_for(server: &MockServer) -> AnthropicEngine {
    let config = EngineConfig::new("sk-test").base_url(server.uri());
    AnthropicEngine::new(config, Language::Python.system_prompt()).unwrap()
}

#[tokio::test]
async fn sends_system_prompt_and_joins_text_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-sonnet-4-20250514",
            "max_tokens": 2048,
            "messages": [{"role": "user", "content": "def add(a, b): return a + b"}],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "```python"},
                {"type": "tool_use", "id": "t", "name": "x", "input": {}},
                {"type": "text", "text": "import unittest\n```"}
            ],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server).await;
    let text = engine
        .send_message("def add(a, b): return a + b")
        .await
        .unwrap();
    assert_eq!(text, "```python\nimport unittest\n```");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(
        body["system"]
            .as_str()
            .unwrap()
            .contains("Python unit test generator")
    );
}

#[tokio::test]
async fn unauthorized_maps_to_auth_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .mount(&server)
        .await;

    let err = engine_for(&server).await.send_message("x").await.unwrap_err();
    assert!(matches!(err, EngineError::AuthFailed { .. }));
}

#[tokio::test]
async fn too_many_requests_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
        .mount(&server)
        .await;

    let err = engine_for(&server).await.send_message("x").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::RateLimited {
            retry_after: Some(17),
            ..
        }
    ));
}

#[tokio::test]
async fn server_error_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = engine_for(&server).await.send_message("x").await.unwrap_err();
    match err {
        EngineError::Http { status, body, .. } => {
            assert_eq!(status, 529);
            assert!(body.contains("overloaded"));
        }
        other => panic!("expected Http, got {other:?}"),
    }
}

#[tokio::test]
async fn no_text_blocks_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [],
            "stop_reason": "max_tokens"
        })))
        .mount(&server)
        .await;

    let err = engine_for(&server).await.send_message("x").await.unwrap_err();
    assert!(matches!(err, EngineError::EmptyResponse { .. }));
}

#[tokio::test]
async fn malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = engine_for(&server).await.send_message("x").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidResponse { .. }));
}

/// Reads one full request, then answers 200 with a body shorter than its
/// declared `Content-Length` and closes the connection.
async fn truncated_body_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&request);
            if let Some(end) = text.find("\r\n\r\n") {
                let declared = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= end + 4 + declared {
                    break;
                }
            }
        }
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 200\r\n\r\n{\"content\":[",
            )
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn body_read_failure_is_request_error() {
    let config = EngineConfig::new("sk-test").base_url(truncated_body_server().await);
    let engine = AnthropicEngine::new(config, Language::Python.system_prompt()).unwrap();

    let err = engine.send_message("x").await.unwrap_err();
    match err {
        EngineError::Request { reason, .. } => {
            assert!(reason.contains("response body"), "unexpected reason: {reason}");
        }
        other => panic!("expected Request, got {other:?}"),
    }
}
