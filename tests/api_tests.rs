//! HTTP surface tests: a full gateway served on an ephemeral port.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voice_serving_gateway::api::routes::create_router;
use voice_serving_gateway::config::{
    CompletionBackendConfig, Settings, SpeechBackendConfig, SpeechDialect,
};
use voice_serving_gateway::AppState;

fn completion_backend(name: &str, server_uri: &str, timeout_ms: u64) -> CompletionBackendConfig {
    CompletionBackendConfig {
        name: name.to_string(),
        endpoint: format!("{}/v1", server_uri),
        model: Some("qwen/qwen-2.5-72b-instruct".to_string()),
        api_key: Some("test-key".to_string()),
        timeout_ms,
        ..Default::default()
    }
}

fn speech_backend(name: &str) -> SpeechBackendConfig {
    SpeechBackendConfig {
        name: name.to_string(),
        dialect: SpeechDialect::Whisper,
        endpoint: "ws://localhost:8765".to_string(),
        ..Default::default()
    }
}

async fn spawn_app(settings: Settings) -> String {
    let state = Arc::new(AppState::from_settings(settings).unwrap());
    let app = create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", addr.port())
}

fn completion_reply(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_726_000_000,
        "model": "qwen/qwen-2.5-72b-instruct",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
    })
}

fn chat_body() -> Value {
    json!({
        "messages": [{"role": "user", "content": "Two green teas please"}]
    })
}

async fn mock_completions(server: &MockServer, template: ResponseTemplate, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(template)
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_health_reports_backend_counts() {
    let mut settings = Settings::default();
    settings.completion.push(completion_backend("openrouter", "http://localhost:1", 1000));
    settings.speech.push(speech_backend("whisper"));
    let app = spawn_app(settings).await;

    let body: Value = reqwest::get(format!("{}/health", app))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["backends"]["completion"], 1);
    assert_eq!(body["backends"]["speech"], 1);
}

#[tokio::test]
async fn test_health_degraded_without_backends() {
    let app = spawn_app(Settings::default()).await;

    let body: Value = reqwest::get(format!("{}/health", app))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_backend_listing_order_and_model_inheritance() {
    let mut settings = Settings::default();
    settings.completion.push(completion_backend("openrouter", "http://localhost:1", 1000));
    settings.completion.push(CompletionBackendConfig {
        name: "vllm".to_string(),
        endpoint: "http://localhost:8000/v1".to_string(),
        api_key: Some("EMPTY".to_string()),
        ..Default::default()
    });
    settings.speech.push(speech_backend("whisper"));
    let app = spawn_app(settings).await;

    let body: Value = reqwest::get(format!("{}/v1/backends", app))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let backends = body["backends"].as_array().unwrap();
    assert_eq!(backends.len(), 3);

    assert_eq!(backends[0]["name"], "openrouter");
    assert_eq!(backends[0]["kind"], "completion");
    assert_eq!(backends[0]["priority"], 0);

    // The second backend declares no model and inherits the primary's.
    assert_eq!(backends[1]["name"], "vllm");
    assert_eq!(backends[1]["model"], "qwen/qwen-2.5-72b-instruct");
    assert_eq!(backends[1]["priority"], 1);

    assert_eq!(backends[2]["name"], "whisper");
    assert_eq!(backends[2]["kind"], "streaming-speech");
    assert_eq!(backends[2]["dialect"], "whisper");
    assert_eq!(backends[2]["priority"], 0);
}

#[tokio::test]
async fn test_chat_completion_round_trip() {
    let upstream = MockServer::start().await;
    let reply = ResponseTemplate::new(200).set_body_json(completion_reply("Your oolong is on its way."));
    mock_completions(&upstream, reply, 1).await;

    let mut settings = Settings::default();
    settings.completion.push(completion_backend("openrouter", &upstream.uri(), 2000));
    let app = spawn_app(settings).await;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/chat/completions", app))
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["backend"], "openrouter");
    assert_eq!(body["choices"][0]["message"]["content"], "Your oolong is on its way.");
    assert_eq!(body["usage"]["total_tokens"], 17);
}

#[tokio::test]
async fn test_chat_falls_back_over_http() {
    let primary = MockServer::start().await;
    mock_completions(&primary, ResponseTemplate::new(500), 1).await;

    let standby = MockServer::start().await;
    let reply = ResponseTemplate::new(200).set_body_json(completion_reply("Standby here."));
    mock_completions(&standby, reply, 1).await;

    let mut settings = Settings::default();
    settings.completion.push(completion_backend("openrouter", &primary.uri(), 2000));
    settings.completion.push(completion_backend("vllm", &standby.uri(), 2000));
    let app = spawn_app(settings).await;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/chat/completions", app))
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["backend"], "vllm");
}

#[tokio::test]
async fn test_empty_messages_rejected() {
    let app = spawn_app(Settings::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/chat/completions", app))
        .json(&json!({"messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_unknown_pinned_backend_rejected_without_any_call() {
    let upstream = MockServer::start().await;
    mock_completions(&upstream, ResponseTemplate::new(200), 0).await;

    let mut settings = Settings::default();
    settings.completion.push(completion_backend("openrouter", &upstream.uri(), 2000));
    let app = spawn_app(settings).await;

    let mut body = chat_body();
    body["backend"] = json!("nonexistent");
    let response = reqwest::Client::new()
        .post(format!("{}/v1/chat/completions", app))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "backend_error");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unknown completion backend"));
}

#[tokio::test]
async fn test_exhaustion_maps_to_service_unavailable() {
    let primary = MockServer::start().await;
    mock_completions(&primary, ResponseTemplate::new(503), 1).await;
    let standby = MockServer::start().await;
    mock_completions(&standby, ResponseTemplate::new(502), 1).await;

    let mut settings = Settings::default();
    settings.completion.push(completion_backend("openrouter", &primary.uri(), 2000));
    settings.completion.push(completion_backend("vllm", &standby.uri(), 2000));
    let app = spawn_app(settings).await;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/chat/completions", app))
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "all_backends_exhausted");
    assert!(body["error"]["message"].as_str().unwrap().contains("2 attempt(s)"));
}

#[tokio::test]
async fn test_missing_completion_config_is_a_server_error() {
    let mut settings = Settings::default();
    settings.speech.push(speech_backend("whisper"));
    let app = spawn_app(settings).await;

    let response = reqwest::Client::new()
        .post(format!("{}/v1/chat/completions", app))
        .json(&chat_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "configuration_error");
}
