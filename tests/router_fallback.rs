//! Completion routing tests against mock HTTP upstreams

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voice_serving_gateway::backend::{
    ChatMessage, CompletionBackend, CompletionDescriptor, CompletionRequest, OpenAiCompatBackend,
};
use voice_serving_gateway::config::CompletionBackendConfig;
use voice_serving_gateway::error::{AppError, BackendError};
use voice_serving_gateway::router::CompletionRouter;

fn backend_for(server_uri: &str, name: &str, timeout_ms: u64) -> Arc<dyn CompletionBackend> {
    let config = CompletionBackendConfig {
        name: name.to_string(),
        endpoint: format!("{}/v1", server_uri),
        model: Some("qwen/qwen-2.5-72b-instruct".to_string()),
        timeout_ms,
        ..Default::default()
    };
    let descriptor = CompletionDescriptor::from_config(&config, None).unwrap();
    Arc::new(OpenAiCompatBackend::new(Arc::new(descriptor)).unwrap())
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "cmpl-1",
        "object": "chat.completion",
        "created": 1719000000,
        "model": "qwen/qwen-2.5-72b-instruct",
        "choices": [
            {"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}
        ],
        "usage": {"prompt_tokens": 12, "completion_tokens": 6, "total_tokens": 18}
    })
}

fn request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: "one green tea, no sugar".to_string(),
        }],
        ..Default::default()
    }
}

async fn mock_completions(server: &MockServer, template: ResponseTemplate, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(template)
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_server_error_falls_back_to_standby() {
    let primary = MockServer::start().await;
    let standby = MockServer::start().await;
    mock_completions(&primary, ResponseTemplate::new(500).set_body_string("overloaded"), 1).await;
    mock_completions(
        &standby,
        ResponseTemplate::new(200).set_body_json(completion_body("Sure, one green tea.")),
        1,
    )
    .await;

    let router = CompletionRouter::new(vec![
        backend_for(&primary.uri(), "openrouter", 5000),
        backend_for(&standby.uri(), "vllm", 5000),
    ]);

    let (response, used) = router.call_with_fallback(&request(), None).await.unwrap();
    assert_eq!(used, "vllm");
    assert_eq!(response.content(), "Sure, one green tea.");
}

#[tokio::test]
async fn test_client_error_is_fatal_and_standby_untouched() {
    let primary = MockServer::start().await;
    let standby = MockServer::start().await;
    mock_completions(
        &primary,
        ResponseTemplate::new(422).set_body_string("unprocessable"),
        1,
    )
    .await;
    // The standby must never see the request.
    mock_completions(
        &standby,
        ResponseTemplate::new(200).set_body_json(completion_body("unused")),
        0,
    )
    .await;

    let router = CompletionRouter::new(vec![
        backend_for(&primary.uri(), "openrouter", 5000),
        backend_for(&standby.uri(), "vllm", 5000),
    ]);

    let err = router.call_with_fallback(&request(), None).await.unwrap_err();
    match err {
        AppError::Backend { backend, source } => {
            assert_eq!(backend, "openrouter");
            assert!(matches!(source, BackendError::InvalidRequest { status: 422, .. }));
        }
        other => panic!("expected a fatal backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_model_is_fatal() {
    let primary = MockServer::start().await;
    mock_completions(
        &primary,
        ResponseTemplate::new(404).set_body_string("model not found"),
        1,
    )
    .await;

    let router = CompletionRouter::new(vec![backend_for(&primary.uri(), "openrouter", 5000)]);

    let err = router.call_with_fallback(&request(), None).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Backend {
            source: BackendError::NotFound(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_rate_limit_escalates() {
    let primary = MockServer::start().await;
    let standby = MockServer::start().await;
    mock_completions(&primary, ResponseTemplate::new(429).set_body_string("slow down"), 1).await;
    mock_completions(
        &standby,
        ResponseTemplate::new(200).set_body_json(completion_body("Coming right up.")),
        1,
    )
    .await;

    let router = CompletionRouter::new(vec![
        backend_for(&primary.uri(), "openrouter", 5000),
        backend_for(&standby.uri(), "vllm", 5000),
    ]);

    let (_, used) = router.call_with_fallback(&request(), None).await.unwrap();
    assert_eq!(used, "vllm");
}

#[tokio::test]
async fn test_malformed_upstream_payload_escalates() {
    let primary = MockServer::start().await;
    let standby = MockServer::start().await;
    mock_completions(
        &primary,
        ResponseTemplate::new(200).set_body_string("this is not json"),
        1,
    )
    .await;
    mock_completions(
        &standby,
        ResponseTemplate::new(200).set_body_json(completion_body("Recovered.")),
        1,
    )
    .await;

    let router = CompletionRouter::new(vec![
        backend_for(&primary.uri(), "openrouter", 5000),
        backend_for(&standby.uri(), "vllm", 5000),
    ]);

    let (response, used) = router.call_with_fallback(&request(), None).await.unwrap();
    assert_eq!(used, "vllm");
    assert_eq!(response.content(), "Recovered.");
}

#[tokio::test]
async fn test_slow_primary_times_out_and_standby_answers() {
    let primary = MockServer::start().await;
    let standby = MockServer::start().await;
    mock_completions(
        &primary,
        ResponseTemplate::new(200)
            .set_body_json(completion_body("too late"))
            .set_delay(Duration::from_secs(30)),
        1,
    )
    .await;
    mock_completions(
        &standby,
        ResponseTemplate::new(200).set_body_json(completion_body("On time.")),
        1,
    )
    .await;

    let router = CompletionRouter::new(vec![
        backend_for(&primary.uri(), "openrouter", 200),
        backend_for(&standby.uri(), "vllm", 5000),
    ]);

    let started = Instant::now();
    let (response, used) = router.call_with_fallback(&request(), None).await.unwrap();

    assert_eq!(used, "vllm");
    assert_eq!(response.content(), "On time.");
    // The primary's budget is 200ms; the whole call must finish well before
    // the mocked 30s delay would.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_all_backends_down_reports_exhaustion() {
    let primary = MockServer::start().await;
    let standby = MockServer::start().await;
    mock_completions(&primary, ResponseTemplate::new(503).set_body_string("down"), 1).await;
    mock_completions(&standby, ResponseTemplate::new(502).set_body_string("down"), 1).await;

    let router = CompletionRouter::new(vec![
        backend_for(&primary.uri(), "openrouter", 5000),
        backend_for(&standby.uri(), "vllm", 5000),
    ]);

    let err = router.call_with_fallback(&request(), None).await.unwrap_err();
    match err {
        AppError::AllBackendsExhausted { attempts, detail, .. } => {
            assert_eq!(attempts, 2);
            assert!(detail.contains("openrouter: server_error"));
            assert!(detail.contains("vllm: server_error"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}
