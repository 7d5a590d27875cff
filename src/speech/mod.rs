//! Streaming speech recognition: provider adapters and the session proxy

pub mod adapter;
pub mod assemblyai;
pub mod event;
pub mod proxy;
pub mod whisper;

pub use adapter::{SpeechConnector, SpeechSink, SpeechSource, Transcript, WebSocketConnector};
pub use event::{ClientFrame, SpeechEvent};
pub use proxy::{ProxySession, SessionContext, SessionState};
