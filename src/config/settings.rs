//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub completion: Vec<CompletionBackendConfig>,
    #[serde(default)]
    pub speech: Vec<SpeechBackendConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_true() -> bool {
    true
}

/// Wire dialect spoken by a streaming speech backend.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpeechDialect {
    AssemblyAi,
    Whisper,
}

impl std::fmt::Display for SpeechDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechDialect::AssemblyAi => write!(f, "assemblyai"),
            SpeechDialect::Whisper => write!(f, "whisper"),
        }
    }
}

/// Completion backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionBackendConfig {
    pub name: String,

    /// Base URL of the OpenAI-compatible API, e.g. `https://openrouter.ai/api/v1`.
    pub endpoint: String,

    /// Model identifier. When unset the backend inherits the model of the
    /// first configured backend that has one.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key. Takes precedence over
    /// `api_key` when the variable is set and non-empty.
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_completion_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra request headers, e.g. attribution headers required by a hosted
    /// router.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_completion_timeout_ms() -> u64 {
    10_000
}

/// Streaming speech backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechBackendConfig {
    pub name: String,

    pub dialect: SpeechDialect,

    /// WebSocket URL, e.g. `wss://streaming.assemblyai.com/v3/ws`.
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Wall clock budget for the connect plus handshake phase.
    #[serde(default = "default_speech_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_audio_encoding")]
    pub encoding: String,

    /// Provider-side model selector, passed through to backends that take one.
    #[serde(default)]
    pub speech_model: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_speech_timeout_ms() -> u64 {
    10_000
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_audio_encoding() -> String {
    "pcm_s16le".to_string()
}

/// YAML backends configuration file structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BackendsFile {
    #[serde(default)]
    pub completion: Vec<CompletionBackendConfig>,

    #[serde(default)]
    pub speech: Vec<SpeechBackendConfig>,
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_paths("config/gateway.yaml", Some("config/backends.yaml"))
    }

    /// Load settings from YAML configuration files
    pub fn load_from_paths<P: AsRef<Path>>(
        gateway_config: P,
        backends_config: Option<P>,
    ) -> Result<Self> {
        let gateway_path = gateway_config.as_ref();

        let mut config_builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?;

        if gateway_path.exists() {
            config_builder =
                config_builder.add_source(File::from(gateway_path).format(FileFormat::Yaml));
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("VOICE_GATEWAY")
                .separator("__")
                .try_parsing(true),
        );

        let config = config_builder.build()?;
        let mut settings: Settings = config.try_deserialize()?;

        if let Some(backends_path) = backends_config {
            let backends_path = backends_path.as_ref();
            if backends_path.exists() {
                let backends = Self::load_backends_file(backends_path)?;
                settings.completion = backends.completion;
                settings.speech = backends.speech;
            }
        }

        Ok(settings)
    }

    /// Load backends configuration from YAML file
    pub fn load_backends_file<P: AsRef<Path>>(path: P) -> Result<BackendsFile> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Config(config::ConfigError::Message(format!(
                "Failed to read backends config: {}",
                e
            )))
        })?;

        let file: BackendsFile = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(config::ConfigError::Message(format!(
                "Failed to parse backends config: {}",
                e
            )))
        })?;

        Ok(file)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "Server port cannot be 0".to_string(),
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for backend in &self.completion {
            if backend.name.is_empty() {
                return Err(AppError::Config(config::ConfigError::Message(
                    "Completion backend name cannot be empty".to_string(),
                )));
            }
            if !seen.insert(backend.name.as_str()) {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Duplicate completion backend name '{}'",
                    backend.name
                ))));
            }
            if backend.endpoint.is_empty() {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Completion backend '{}' must have an endpoint",
                    backend.name
                ))));
            }
            if backend.timeout_ms == 0 {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Completion backend '{}' must have a non-zero timeout",
                    backend.name
                ))));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for backend in &self.speech {
            if backend.name.is_empty() {
                return Err(AppError::Config(config::ConfigError::Message(
                    "Speech backend name cannot be empty".to_string(),
                )));
            }
            if !seen.insert(backend.name.as_str()) {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Duplicate speech backend name '{}'",
                    backend.name
                ))));
            }
            if !backend.endpoint.starts_with("ws://") && !backend.endpoint.starts_with("wss://") {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Speech backend '{}' endpoint must be a ws:// or wss:// URL",
                    backend.name
                ))));
            }
            if backend.timeout_ms == 0 {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Speech backend '{}' must have a non-zero timeout",
                    backend.name
                ))));
            }
        }

        Ok(())
    }

    /// Get enabled completion backends in configured order
    pub fn enabled_completion(&self) -> Vec<&CompletionBackendConfig> {
        self.completion.iter().filter(|b| b.enabled).collect()
    }

    /// Get enabled speech backends in configured order
    pub fn enabled_speech(&self) -> Vec<&SpeechBackendConfig> {
        self.speech.iter().filter(|b| b.enabled).collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
            completion: vec![],
            speech: vec![],
        }
    }
}

impl Default for CompletionBackendConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            endpoint: String::new(),
            model: None,
            api_key: None,
            api_key_env: None,
            timeout_ms: default_completion_timeout_ms(),
            headers: HashMap::new(),
            enabled: true,
        }
    }
}

impl Default for SpeechBackendConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            dialect: SpeechDialect::AssemblyAi,
            endpoint: String::new(),
            api_key: None,
            api_key_env: None,
            timeout_ms: default_speech_timeout_ms(),
            sample_rate: default_sample_rate(),
            encoding: default_audio_encoding(),
            speech_model: None,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.completion.is_empty());
        assert!(settings.speech.is_empty());
    }

    #[test]
    fn test_dialect_serialization() {
        let backend = SpeechBackendConfig {
            name: "whisper".to_string(),
            dialect: SpeechDialect::Whisper,
            endpoint: "ws://localhost:8765".to_string(),
            ..Default::default()
        };

        let yaml = serde_yaml::to_string(&backend).unwrap();
        assert!(yaml.contains("dialect: whisper"));
    }

    #[test]
    fn test_backends_file_parsing() {
        let yaml = r#"
completion:
  - name: openrouter
    endpoint: https://openrouter.ai/api/v1
    model: qwen/qwen-2.5-72b-instruct
    api_key_env: OPENROUTER_API_KEY
    timeout_ms: 5000
speech:
  - name: assemblyai
    dialect: assemblyai
    endpoint: wss://streaming.assemblyai.com/v3/ws
    api_key_env: ASSEMBLYAI_API_KEY
    timeout_ms: 3000
    speech_model: universal-streaming-english
"#;
        let file: BackendsFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.completion.len(), 1);
        assert_eq!(file.completion[0].timeout_ms, 5000);
        assert_eq!(file.speech.len(), 1);
        assert_eq!(file.speech[0].dialect, SpeechDialect::AssemblyAi);
        assert_eq!(file.speech[0].sample_rate, 16_000);
        assert_eq!(file.speech[0].encoding, "pcm_s16le");
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let mut settings = Settings::default();
        settings.completion = vec![
            CompletionBackendConfig {
                name: "vllm".to_string(),
                endpoint: "http://localhost:8000/v1".to_string(),
                ..Default::default()
            },
            CompletionBackendConfig {
                name: "vllm".to_string(),
                endpoint: "http://localhost:8001/v1".to_string(),
                ..Default::default()
            },
        ];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_websocket_speech_endpoint() {
        let mut settings = Settings::default();
        settings.speech = vec![SpeechBackendConfig {
            name: "assemblyai".to_string(),
            endpoint: "https://streaming.assemblyai.com/v3/ws".to_string(),
            ..Default::default()
        }];
        assert!(settings.validate().is_err());
    }
}
