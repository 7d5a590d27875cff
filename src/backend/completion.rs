//! Completion backend client for OpenAI API compatible endpoints
//! (OpenRouter, vLLM, and anything else speaking `/chat/completions`)

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use utoipa::ToSchema;

use crate::backend::descriptor::CompletionDescriptor;
use crate::error::{AppError, BackendError, Result};

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Normalized completion request.
///
/// Carries no model: every backend serves the model it was configured with,
/// so escalation never silently changes the request payload semantics.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// OpenAI compatible wire request
#[derive(Debug, Serialize)]
struct ChatCompletionPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Chat completion response (OpenAI compatible)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompletionResponse {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Content of the first choice, empty when the upstream returned none.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("")
    }
}

/// Chat choice
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One completion backend: exactly one upstream call per invocation.
///
/// Implementations never retry internally; failure handling belongs to the
/// router, which reads the returned [`BackendError`] kind.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Wall clock budget for a single call against this backend.
    fn timeout(&self) -> Duration;

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, BackendError>;
}

/// OpenAI API compatible completion backend
pub struct OpenAiCompatBackend {
    descriptor: Arc<CompletionDescriptor>,
    client: Client,
}

impl OpenAiCompatBackend {
    pub fn new(descriptor: Arc<CompletionDescriptor>) -> Result<Self> {
        // The client timeout is a safety net; the router enforces the same
        // budget around the whole call.
        let client = Client::builder()
            .timeout(descriptor.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { descriptor, client })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = &self.descriptor.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        for (name, value) in &self.descriptor.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        headers
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn timeout(&self) -> Duration {
        self.descriptor.timeout
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, BackendError> {
        let url = format!("{}/chat/completions", self.descriptor.endpoint);
        let payload = ChatCompletionPayload {
            model: &self.descriptor.model,
            messages: &request.messages,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
        };

        debug!(
            backend = %self.descriptor.name,
            model = %self.descriptor.model,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, self.descriptor.timeout))?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<CompletionResponse>()
                .await
                .map_err(|e| BackendError::Decode(e.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(BackendError::from_status(status.as_u16(), body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionBackendConfig;
    use std::collections::HashMap;

    fn backend_with(api_key: Option<&str>, headers: HashMap<String, String>) -> OpenAiCompatBackend {
        let config = CompletionBackendConfig {
            name: "openrouter".to_string(),
            endpoint: "https://openrouter.ai/api/v1".to_string(),
            model: Some("qwen/qwen-2.5-72b-instruct".to_string()),
            api_key: api_key.map(str::to_string),
            headers,
            ..Default::default()
        };
        let descriptor = CompletionDescriptor::from_config(&config, None).unwrap();
        OpenAiCompatBackend::new(Arc::new(descriptor)).unwrap()
    }

    #[test]
    fn test_bearer_and_extra_headers() {
        let mut extra = HashMap::new();
        extra.insert("HTTP-Referer".to_string(), "https://example.com".to_string());
        extra.insert("X-Title".to_string(), "Tea Ordering".to_string());

        let backend = backend_with(Some("sk-test"), extra);
        let headers = backend.headers();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-test");
        assert_eq!(headers.get("HTTP-Referer").unwrap(), "https://example.com");
        assert_eq!(headers.get("X-Title").unwrap(), "Tea Ordering");
    }

    #[test]
    fn test_no_auth_header_without_key() {
        let backend = backend_with(None, HashMap::new());
        assert!(backend.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_payload_omits_unset_sampling_parameters() {
        let payload = ChatCompletionPayload {
            model: "m",
            messages: &[ChatMessage {
                role: "user".to_string(),
                content: "one jasmine tea".to_string(),
            }],
            temperature: Some(0.7),
            top_p: None,
            max_tokens: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["model"], "m");
        assert_eq!(value["temperature"], 0.7);
        assert!(value.get("top_p").is_none());
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn test_response_content_accessor() {
        let json = r#"{
            "id": "cmpl-1",
            "object": "chat.completion",
            "created": 1719000000,
            "model": "qwen/qwen-2.5-72b-instruct",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Sure, one jasmine tea."}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18}
        }"#;
        let response: CompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.content(), "Sure, one jasmine tea.");
    }
}
