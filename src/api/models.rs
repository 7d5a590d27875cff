//! API request and response models

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::backend::{ChatChoice, ChatMessage, CompletionResponse, Usage};

/// Chat completion request (OpenAI compatible subset)
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ChatCompletionApiRequest {
    /// The conversation so far
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Nucleus sampling cutoff
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Specific backend to try first (extension). The remaining backends
    /// still serve as fallbacks in their configured order.
    #[serde(default)]
    pub backend: Option<String>,
}

/// Chat completion response, annotated with the backend that served it
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ChatCompletionApiResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Name of the backend that produced this response (extension)
    pub backend: String,
}

impl ChatCompletionApiResponse {
    pub fn from_backend(response: CompletionResponse, backend: String) -> Self {
        // Some upstreams omit the created timestamp; stamp it here so the
        // client always gets one.
        let created = if response.created > 0 {
            response.created
        } else {
            chrono::Utc::now().timestamp()
        };
        Self {
            id: response.id,
            object: response.object,
            created,
            model: response.model,
            choices: response.choices,
            usage: response.usage,
            backend,
        }
    }
}

/// One configured backend, as reported by the management API
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct BackendSummary {
    pub name: String,
    /// Protocol kind: "completion" or "streaming-speech"
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    pub timeout_ms: u64,
    /// Position in the fallback order, 0 being the primary
    pub priority: usize,
}

/// Backend list response
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct BackendListResponse {
    pub backends: Vec<BackendSummary>,
}

/// Health check response
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backends: BackendCounts,
}

/// Registered backend counts per protocol kind
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct BackendCounts {
    pub completion: usize,
    pub speech: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream_response(created: i64) -> CompletionResponse {
        CompletionResponse {
            id: "cmpl-1".to_string(),
            object: "chat.completion".to_string(),
            created,
            model: "qwen/qwen-2.5-72b-instruct".to_string(),
            choices: vec![],
            usage: None,
        }
    }

    #[test]
    fn test_created_passes_through_when_present() {
        let api = ChatCompletionApiResponse::from_backend(
            upstream_response(1_719_000_000),
            "openrouter".to_string(),
        );
        assert_eq!(api.created, 1_719_000_000);
        assert_eq!(api.backend, "openrouter");
    }

    #[test]
    fn test_created_is_stamped_when_missing() {
        let api = ChatCompletionApiResponse::from_backend(upstream_response(0), "vllm".to_string());
        assert!(api.created > 1_700_000_000);
    }
}
