//! HTTP route definitions

use crate::api::models::*;
use crate::api::{handlers, stt_ws};
use crate::backend::{ChatChoice, ChatMessage, Usage};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI documentation
///
/// The streaming speech endpoint at `GET /ws/stt` is a WebSocket upgrade,
/// which OpenAPI cannot describe; the API description mentions it instead.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Voice Serving Gateway API",
        version = "0.2.0",
        description = "Resilient serving gateway for a voice ordering assistant. \
                       Chat completions are routed across OpenAI compatible backends \
                       with ordered fallback; streaming speech recognition is proxied \
                       transparently over /ws/stt.",
        license(name = "MIT"),
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    paths(
        handlers::chat_completion,
        handlers::list_backends,
        handlers::health_check,
    ),
    components(schemas(
        ChatCompletionApiRequest,
        ChatCompletionApiResponse,
        BackendSummary,
        BackendListResponse,
        HealthResponse,
        BackendCounts,
        ChatMessage,
        ChatChoice,
        Usage,
    )),
    tags(
        (name = "Chat", description = "Chat completion endpoints"),
        (name = "Backends", description = "Backend listing endpoints"),
        (name = "Health", description = "Health and monitoring endpoints"),
    )
)]
pub struct ApiDoc;

/// Create the main application router
pub fn create_router(state: Arc<crate::AppState>) -> Router {
    // API routes under the /v1 prefix
    let api_routes = Router::new()
        .route("/chat/completions", post(handlers::chat_completion))
        .route("/backends", get(handlers::list_backends));

    Router::new()
        // Health check endpoint
        .route("/health", get(handlers::health_check))
        // Streaming speech sessions (WebSocket upgrade)
        .route("/ws/stt", get(stt_ws::stt_session))
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/v1", api_routes)
        // Add shared state
        .with_state(state)
        // Browser clients drive both the HTTP and the WebSocket side
        .layer(CorsLayer::permissive())
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}
