//! AssemblyAI Universal-Streaming (v3) adapter
//!
//! Outbound audio is raw binary PCM; the handshake carries sample rate,
//! encoding and model as query parameters plus the API key as a raw
//! `Authorization` header. Inbound traffic is JSON: `Begin`, `Turn` and
//! `Termination` messages. `Begin`/`Termination` are session lifecycle and
//! are consumed here, never forwarded.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;
use url::Url;

use crate::backend::descriptor::SpeechDescriptor;
use crate::error::BackendError;
use crate::speech::adapter::{
    classify_ws_error, SpeechChannel, SpeechSink, SpeechSource, Transcript, WsSink, WsSource,
};

const TERMINATE_MESSAGE: &str = r#"{"type":"Terminate"}"#;

/// Open a streaming session and complete the handshake.
pub(crate) async fn connect(backend: &SpeechDescriptor) -> Result<SpeechChannel, BackendError> {
    let mut url =
        Url::parse(&backend.endpoint).map_err(|e| BackendError::InvalidArgument(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("sample_rate", &backend.sample_rate.to_string())
        .append_pair("encoding", &backend.encoding);
    if let Some(model) = &backend.speech_model {
        url.query_pairs_mut().append_pair("speech_model", model);
    }

    let mut request = url.as_str().into_client_request().map_err(classify_ws_error)?;
    if let Some(key) = &backend.api_key {
        let value = HeaderValue::from_str(key)
            .map_err(|e| BackendError::InvalidArgument(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (stream, _) = connect_async(request).await.map_err(classify_ws_error)?;
    debug!(backend = %backend.name, "AssemblyAI handshake complete");

    let (sink, source) = stream.split();
    Ok((
        Box::new(AssemblyAiSink { sink }),
        Box::new(AssemblyAiSource {
            source,
            turns: TurnTracker::default(),
        }),
    ))
}

struct AssemblyAiSink {
    sink: WsSink,
}

#[async_trait]
impl SpeechSink for AssemblyAiSink {
    async fn send_audio(&mut self, frame: Bytes) -> Result<(), BackendError> {
        self.sink
            .send(Message::Binary(frame.to_vec()))
            .await
            .map_err(classify_ws_error)
    }

    async fn finish(&mut self) -> Result<(), BackendError> {
        self.sink
            .send(Message::Text(TERMINATE_MESSAGE.to_string()))
            .await
            .map_err(classify_ws_error)
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

struct AssemblyAiSource {
    source: WsSource,
    turns: TurnTracker,
}

#[async_trait]
impl SpeechSource for AssemblyAiSource {
    async fn next(&mut self) -> Result<Option<Transcript>, BackendError> {
        loop {
            if let Some(transcript) = self.turns.pop() {
                return Ok(Some(transcript));
            }
            if self.turns.terminated {
                return Ok(None);
            }

            let message = match self.source.next().await {
                None => return Ok(None),
                Some(Err(tungstenite::Error::ConnectionClosed))
                | Some(Err(tungstenite::Error::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => return Err(classify_ws_error(e)),
                Some(Ok(message)) => message,
            };

            match message {
                Message::Text(text) => self.turns.ingest(&text),
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum UpstreamMessage {
    Begin {
        #[serde(default)]
        id: Option<String>,
    },
    Turn {
        #[serde(default)]
        transcript: String,
        #[serde(default)]
        end_of_turn: bool,
        #[serde(default)]
        turn_order: Option<u64>,
        #[serde(default)]
        utterance: Option<String>,
    },
    Termination {
        #[serde(default)]
        audio_duration_seconds: Option<f64>,
    },
    #[serde(other)]
    Unknown,
}

/// Turn-level protocol state: dedup of finals by `turn_order` and the
/// partial/final split of one `Turn` message.
#[derive(Debug, Default)]
struct TurnTracker {
    seen_turns: HashSet<u64>,
    pending: VecDeque<Transcript>,
    terminated: bool,
}

impl TurnTracker {
    fn ingest(&mut self, text: &str) {
        let parsed: UpstreamMessage = match serde_json::from_str(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "Ignoring unparseable AssemblyAI frame");
                return;
            }
        };

        match parsed {
            UpstreamMessage::Begin { id } => {
                debug!(upstream_session = id.as_deref().unwrap_or("unknown"), "AssemblyAI session began");
            }
            UpstreamMessage::Termination { audio_duration_seconds } => {
                debug!(audio_duration_seconds, "AssemblyAI session terminated");
                self.terminated = true;
            }
            UpstreamMessage::Turn {
                transcript,
                end_of_turn,
                turn_order,
                utterance,
            } => {
                if !transcript.is_empty() {
                    self.pending
                        .push_back(Transcript::Partial(transcript.clone()));
                }

                // Finals prefer the formatted utterance; a turn may be
                // delivered more than once, so dedup on turn_order.
                let final_text = {
                    let utterance = utterance.unwrap_or_default();
                    let candidate = if utterance.is_empty() { transcript } else { utterance };
                    candidate.trim().to_string()
                };
                if end_of_turn && !final_text.is_empty() {
                    if let Some(order) = turn_order {
                        if self.seen_turns.insert(order) {
                            self.pending.push_back(Transcript::Final(final_text));
                        }
                    }
                }
            }
            UpstreamMessage::Unknown => {
                debug!("Ignoring unrecognized AssemblyAI message");
            }
        }
    }

    fn pop(&mut self) -> Option<Transcript> {
        self.pending.pop_front()
    }
}
