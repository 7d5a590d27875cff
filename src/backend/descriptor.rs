//! Backend descriptors built from configuration at startup

use crate::config::{CompletionBackendConfig, SpeechBackendConfig, SpeechDialect};
use std::collections::HashMap;
use std::time::Duration;

/// Protocol kind a backend serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Completion,
    StreamingSpeech,
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolKind::Completion => write!(f, "completion"),
            ProtocolKind::StreamingSpeech => write!(f, "streaming-speech"),
        }
    }
}

/// Anything that can live in a [`super::registry::BackendOrdering`].
pub trait BackendEntry {
    fn name(&self) -> &str;
}

/// Why a configured backend was left out of the ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// `api_key_env` names a variable that is unset or empty, and no inline
    /// key is available.
    MissingCredential { env: String },
    /// Completion backend with no model of its own and none to inherit.
    MissingModel,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "disabled in configuration"),
            SkipReason::MissingCredential { env } => {
                write!(f, "credential variable {} is unset", env)
            }
            SkipReason::MissingModel => write!(f, "no model configured or inherited"),
        }
    }
}

/// Resolve a backend credential from the environment or an inline value.
///
/// Returns `Err` only when an environment variable is named but yields
/// nothing and no inline fallback exists; `Ok(None)` means the backend
/// legitimately runs without a credential.
fn resolve_credential(
    api_key_env: &Option<String>,
    api_key: &Option<String>,
) -> std::result::Result<Option<String>, SkipReason> {
    let inline = api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    match api_key_env {
        Some(var) => {
            let from_env = std::env::var(var)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            match from_env.or(inline) {
                Some(key) => Ok(Some(key)),
                None => Err(SkipReason::MissingCredential { env: var.clone() }),
            }
        }
        None => Ok(inline),
    }
}

/// A completion backend with credentials and model resolved.
#[derive(Debug, Clone)]
pub struct CompletionDescriptor {
    pub name: String,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
}

impl CompletionDescriptor {
    /// Build a descriptor from configuration.
    ///
    /// `inherited_model` is the model of the first configured backend that
    /// declares one; backends without their own model fall back to it.
    pub fn from_config(
        config: &CompletionBackendConfig,
        inherited_model: Option<&str>,
    ) -> std::result::Result<Self, SkipReason> {
        if !config.enabled {
            return Err(SkipReason::Disabled);
        }
        let api_key = resolve_credential(&config.api_key_env, &config.api_key)?;
        // A blank model means "inherit", matching the empty-string
        // convention of older backend lists.
        let model = config
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| inherited_model.map(str::to_string))
            .ok_or(SkipReason::MissingModel)?;

        Ok(Self {
            name: config.name.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            timeout: Duration::from_millis(config.timeout_ms),
            headers: config.headers.clone(),
        })
    }
}

impl BackendEntry for CompletionDescriptor {
    fn name(&self) -> &str {
        &self.name
    }
}

/// A streaming speech backend with credentials resolved.
#[derive(Debug, Clone)]
pub struct SpeechDescriptor {
    pub name: String,
    pub dialect: SpeechDialect,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub sample_rate: u32,
    pub encoding: String,
    pub speech_model: Option<String>,
}

impl SpeechDescriptor {
    pub fn from_config(config: &SpeechBackendConfig) -> std::result::Result<Self, SkipReason> {
        if !config.enabled {
            return Err(SkipReason::Disabled);
        }
        let api_key = resolve_credential(&config.api_key_env, &config.api_key)?;

        Ok(Self {
            name: config.name.clone(),
            dialect: config.dialect,
            endpoint: config.endpoint.clone(),
            api_key,
            timeout: Duration::from_millis(config.timeout_ms),
            sample_rate: config.sample_rate,
            encoding: config.encoding.clone(),
            speech_model: config.speech_model.clone(),
        })
    }
}

impl BackendEntry for SpeechDescriptor {
    fn name(&self) -> &str {
        &self.name
    }
}
