//! Adapter seam between the proxy core and provider wire protocols
//!
//! The proxy's forwarding loops only ever see these traits. Each provider
//! implements them once; the proxy never branches on a dialect.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_tungstenite::tungstenite;

use crate::backend::descriptor::SpeechDescriptor;
use crate::config::SpeechDialect;
use crate::error::BackendError;

/// Recognition output normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    Partial(String),
    Final(String),
}

/// Write half of an upstream speech session.
#[async_trait]
pub trait SpeechSink: Send {
    /// Forward one audio frame in the provider's expected envelope.
    async fn send_audio(&mut self, frame: Bytes) -> Result<(), BackendError>;

    /// Deliver the provider's end-of-stream signal. No audio may be sent
    /// afterwards; recognition events keep flowing until the source drains.
    async fn finish(&mut self) -> Result<(), BackendError>;

    /// Tear the upstream connection down. Best effort and idempotent.
    async fn close(&mut self);
}

/// Read half of an upstream speech session.
#[async_trait]
pub trait SpeechSource: Send {
    /// Next recognition event. `Ok(None)` means the upstream closed its side
    /// cleanly; an error means the session is no longer usable.
    async fn next(&mut self) -> Result<Option<Transcript>, BackendError>;
}

pub type SpeechChannel = (Box<dyn SpeechSink>, Box<dyn SpeechSource>);

/// Opens upstream sessions.
///
/// `open` either returns a fully handshaken channel or fails leaving no
/// connection behind; dropping the returned future mid-flight likewise
/// releases any half-open socket.
#[async_trait]
pub trait SpeechConnector: Send + Sync {
    async fn open(&self, backend: &SpeechDescriptor) -> Result<SpeechChannel, BackendError>;
}

/// Production connector: one WebSocket adapter per dialect.
#[derive(Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl SpeechConnector for WebSocketConnector {
    async fn open(&self, backend: &SpeechDescriptor) -> Result<SpeechChannel, BackendError> {
        match backend.dialect {
            SpeechDialect::AssemblyAi => crate::speech::assemblyai::connect(backend).await,
            SpeechDialect::Whisper => crate::speech::whisper::connect(backend).await,
        }
    }
}

pub(crate) type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
pub(crate) type WsSink = futures::stream::SplitSink<WsStream, tungstenite::Message>;
pub(crate) type WsSource = futures::stream::SplitStream<WsStream>;

/// Map a WebSocket transport error to the failure taxonomy.
pub(crate) fn classify_ws_error(err: tungstenite::Error) -> BackendError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status().as_u16();
            let message = response
                .body()
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            BackendError::from_status(status, message)
        }
        tungstenite::Error::Url(e) => BackendError::InvalidArgument(e.to_string()),
        other => BackendError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_rejection_maps_by_status() {
        let response = tungstenite::http::Response::builder()
            .status(429)
            .body(None)
            .unwrap();
        let err = classify_ws_error(tungstenite::Error::Http(response));
        assert!(matches!(err, BackendError::RateLimited));

        let response = tungstenite::http::Response::builder()
            .status(401)
            .body(Some(b"bad key".to_vec()))
            .unwrap();
        let err = classify_ws_error(tungstenite::Error::Http(response));
        assert!(matches!(err, BackendError::InvalidRequest { status: 401, .. }));
    }

    #[test]
    fn test_transport_errors_are_retriable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = classify_ws_error(tungstenite::Error::Io(io));
        assert!(err.is_retriable());
    }
}
