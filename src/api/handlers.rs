//! HTTP request handlers

use crate::api::models::{
    BackendCounts, BackendListResponse, BackendSummary, ChatCompletionApiRequest,
    ChatCompletionApiResponse, HealthResponse,
};
use crate::backend::{CompletionRequest, ProtocolKind};
use crate::error::AppError;
use crate::AppState;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

/// Chat completion with ordered backend fallback
#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    tag = "Chat",
    request_body = ChatCompletionApiRequest,
    responses(
        (status = 200, description = "Completion produced by one of the configured backends", body = ChatCompletionApiResponse),
        (status = 400, description = "Invalid request or unknown pinned backend"),
        (status = 503, description = "All backends exhausted"),
    )
)]
pub async fn chat_completion(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatCompletionApiRequest>,
) -> Result<Json<ChatCompletionApiResponse>, AppError> {
    info!(
        messages = request.messages.len(),
        preferred = request.backend.as_deref().unwrap_or("none"),
        "Received chat completion request"
    );

    if request.messages.is_empty() {
        return Err(AppError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }

    let completion_request = CompletionRequest {
        messages: request.messages,
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
    };

    let (response, backend_used) = state
        .completion_router
        .call_with_fallback(&completion_request, request.backend.as_deref())
        .await?;

    info!(
        backend = %backend_used,
        model = %response.model,
        "Chat completion served"
    );

    Ok(Json(ChatCompletionApiResponse::from_backend(
        response,
        backend_used,
    )))
}

/// List all registered backends in fallback order
#[utoipa::path(
    get,
    path = "/v1/backends",
    tag = "Backends",
    responses(
        (status = 200, description = "Configured backends per protocol kind", body = BackendListResponse)
    )
)]
pub async fn list_backends(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BackendListResponse>, AppError> {
    let mut backends = Vec::new();

    for (priority, entry) in state.registry.completion().iter().enumerate() {
        backends.push(BackendSummary {
            name: entry.name.clone(),
            kind: ProtocolKind::Completion.to_string(),
            model: Some(entry.model.clone()),
            dialect: None,
            timeout_ms: entry.timeout.as_millis() as u64,
            priority,
        });
    }

    for (priority, entry) in state.registry.speech().iter().enumerate() {
        backends.push(BackendSummary {
            name: entry.name.clone(),
            kind: ProtocolKind::StreamingSpeech.to_string(),
            model: entry.speech_model.clone(),
            dialect: Some(entry.dialect.to_string()),
            timeout_ms: entry.timeout.as_millis() as u64,
            priority,
        });
    }

    Ok(Json(BackendListResponse { backends }))
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, AppError> {
    let completion = state.registry.completion().len();
    let speech = state.registry.speech().len();

    Ok(Json(HealthResponse {
        status: if completion + speech > 0 {
            "healthy"
        } else {
            "degraded"
        }
        .to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backends: BackendCounts { completion, speech },
    }))
}
