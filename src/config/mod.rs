//! Configuration module

pub mod settings;

pub use settings::{
    CompletionBackendConfig, LoggingConfig, ServerConfig, Settings, SpeechBackendConfig,
    SpeechDialect,
};
