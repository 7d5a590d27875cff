//! Client-facing event protocol for streaming sessions
//!
//! Every event sent to the client has the same shape regardless of which
//! backend served the session; provider envelopes never leak through.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One frame received from the client leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Raw PCM audio to forward upstream.
    Audio(Bytes),
    /// The client is done speaking; drain final transcripts and wind down.
    EndOfStream,
}

impl ClientFrame {
    /// Parse a text frame from the client.
    ///
    /// Accepts `{"event": "flush"}` as end-of-stream and
    /// `{"audio_data": "<base64>"}` as audio. Anything else, including
    /// undecodable base64, is ignored so one bad frame never kills a session.
    pub fn from_text(text: &str) -> Option<ClientFrame> {
        let inbound: InboundText = serde_json::from_str(text).ok()?;

        if inbound.event.as_deref() == Some("flush") {
            return Some(ClientFrame::EndOfStream);
        }

        let encoded = inbound.audio_data?;
        let decoded = BASE64.decode(encoded.as_bytes()).ok()?;
        if decoded.is_empty() {
            return None;
        }
        Some(ClientFrame::Audio(Bytes::from(decoded)))
    }
}

#[derive(Debug, Deserialize)]
struct InboundText {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    audio_data: Option<String>,
}

/// Normalized event sent to the client over the session socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum SpeechEvent {
    PartialTranscript {
        text: String,
    },
    FinalTranscript {
        text: String,
    },
    /// Sent at most once per session, before any transcript, when the
    /// session is served by a backend other than the ordering's primary.
    FallbackNotice {
        #[serde(rename = "from")]
        from_backend: String,
        #[serde(rename = "to")]
        to_backend: String,
        reason: String,
    },
    /// Terminal error. The detail stays generic; provider error text goes
    /// to the logs, not to the client.
    Error {
        detail: String,
    },
}
