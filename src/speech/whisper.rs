//! Whisper bridge adapter
//!
//! The bridge speaks JSON both ways: outbound audio travels as
//! `{"audio_data": "<base64>"}` text frames, inbound recognition events are
//! tagged with `message_type`. End-of-stream is a plain WebSocket close from
//! our side; the bridge flushes its remaining finals before closing.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use crate::backend::descriptor::SpeechDescriptor;
use crate::error::BackendError;
use crate::speech::adapter::{
    classify_ws_error, SpeechChannel, SpeechSink, SpeechSource, Transcript, WsSink, WsSource,
};

/// Open a bridge session. The bridge takes no handshake parameters; a
/// credential, when configured, is passed as a raw `Authorization` header.
pub(crate) async fn connect(backend: &SpeechDescriptor) -> Result<SpeechChannel, BackendError> {
    let mut request = backend
        .endpoint
        .as_str()
        .into_client_request()
        .map_err(classify_ws_error)?;
    if let Some(key) = &backend.api_key {
        let value = HeaderValue::from_str(key)
            .map_err(|e| BackendError::InvalidArgument(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (stream, _) = connect_async(request).await.map_err(classify_ws_error)?;
    debug!(backend = %backend.name, "Whisper bridge handshake complete");

    let (sink, source) = stream.split();
    Ok((
        Box::new(WhisperSink { sink }),
        Box::new(WhisperSource { source }),
    ))
}

struct WhisperSink {
    sink: WsSink,
}

#[async_trait]
impl SpeechSink for WhisperSink {
    async fn send_audio(&mut self, frame: Bytes) -> Result<(), BackendError> {
        let envelope = json!({ "audio_data": BASE64.encode(&frame) }).to_string();
        self.sink
            .send(Message::Text(envelope))
            .await
            .map_err(classify_ws_error)
    }

    async fn finish(&mut self) -> Result<(), BackendError> {
        match self.sink.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(classify_ws_error(e)),
        }
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

struct WhisperSource {
    source: WsSource,
}

#[async_trait]
impl SpeechSource for WhisperSource {
    async fn next(&mut self) -> Result<Option<Transcript>, BackendError> {
        loop {
            let message = match self.source.next().await {
                None => return Ok(None),
                Some(Err(tungstenite::Error::ConnectionClosed))
                | Some(Err(tungstenite::Error::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => return Err(classify_ws_error(e)),
                Some(Ok(message)) => message,
            };

            match message {
                Message::Text(text) => {
                    if let Some(transcript) = parse_bridge_message(&text) {
                        return Ok(Some(transcript));
                    }
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
enum BridgeMessage {
    PartialTranscript {
        #[serde(default)]
        text: String,
    },
    FinalTranscript {
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Unknown,
}

fn parse_bridge_message(text: &str) -> Option<Transcript> {
    let parsed: BridgeMessage = match serde_json::from_str(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable Whisper bridge frame");
            return None;
        }
    };

    match parsed {
        BridgeMessage::PartialTranscript { text } if !text.is_empty() => {
            Some(Transcript::Partial(text))
        }
        BridgeMessage::FinalTranscript { text } => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                Some(Transcript::Final(text.to_string()))
            }
        }
        _ => None,
    }
}
