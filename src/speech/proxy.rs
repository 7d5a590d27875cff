//! Session proxy: ordered upstream selection and bidirectional bridging

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::descriptor::SpeechDescriptor;
use crate::backend::registry::BackendOrdering;
use crate::error::BackendError;
use crate::router::attempt::CallAttempt;
use crate::speech::adapter::{SpeechChannel, SpeechConnector, SpeechSink, SpeechSource, Transcript};
use crate::speech::event::{ClientFrame, SpeechEvent};

/// Lifecycle of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Bridged,
    Closing,
    Closed,
    /// Terminal: no upstream could be bound. Only reachable from
    /// `Connecting`.
    Failed,
}

/// Per-connection record correlating the session with the backend that
/// ultimately serves it.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub chosen_backend: Option<String>,
    pub fallback_notice_sent: bool,
}

enum ConnectOutcome {
    Connected(SpeechChannel),
    Failed { detail: &'static str },
    Cancelled,
}

/// One live streaming session.
///
/// The session is exclusively owned by the task driving its client
/// connection; nothing here is shared across sessions. The client socket is
/// represented by a frame receiver and an event sender so the proxy core
/// stays independent of the server transport: the event sender is the
/// session's single path to the client socket, which keeps writes serialized
/// even though two forwarding legs run concurrently.
pub struct ProxySession {
    context: SessionContext,
    state: SessionState,
    pending_notice: Option<SpeechEvent>,
}

impl ProxySession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            context: SessionContext {
                session_id: session_id.into(),
                chosen_backend: None,
                fallback_notice_sent: false,
            },
            state: SessionState::Idle,
            pending_notice: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(
                session_id = %self.context.session_id,
                from = ?self.state,
                to = ?next,
                "Session state change"
            );
            self.state = next;
        }
    }

    /// Tear the session down. Idempotent: closing an already terminal
    /// session does nothing and reports `false`.
    ///
    /// Upstream handles are owned by the forwarding legs and released when
    /// those return, so this only finalizes the state machine.
    pub fn close(&mut self) -> bool {
        match self.state {
            SessionState::Closed | SessionState::Failed => false,
            _ => {
                self.transition(SessionState::Closing);
                self.transition(SessionState::Closed);
                true
            }
        }
    }

    /// Drive one session to completion.
    ///
    /// `frames` is the inbound client leg and `events` the outbound one;
    /// `cancel` aborts the session at any point, including mid-handshake,
    /// without leaking a half-open upstream socket. Returns the terminal
    /// state.
    pub async fn run(
        &mut self,
        ordering: &BackendOrdering<SpeechDescriptor>,
        connector: &dyn SpeechConnector,
        frames: mpsc::Receiver<ClientFrame>,
        events: mpsc::Sender<SpeechEvent>,
        cancel: CancellationToken,
    ) -> SessionState {
        self.transition(SessionState::Connecting);
        if ordering.is_empty() {
            warn!(session_id = %self.context.session_id, "No speech backends configured");
            let _ = events
                .send(SpeechEvent::Error {
                    detail: "speech recognition is not configured".to_string(),
                })
                .await;
            self.transition(SessionState::Failed);
            return self.state;
        }
        let (sink, source) = match self.connect_upstream(ordering, connector, &cancel).await {
            ConnectOutcome::Connected(channel) => channel,
            ConnectOutcome::Failed { detail } => {
                let _ = events
                    .send(SpeechEvent::Error {
                        detail: detail.to_string(),
                    })
                    .await;
                self.transition(SessionState::Failed);
                return self.state;
            }
            ConnectOutcome::Cancelled => {
                self.close();
                return self.state;
            }
        };

        self.transition(SessionState::Bridged);
        info!(
            session_id = %self.context.session_id,
            backend = self.context.chosen_backend.as_deref().unwrap_or(""),
            "Session bridged"
        );

        if let Some(notice) = self.pending_notice.take() {
            if events.send(notice).await.is_err() {
                self.close();
                return self.state;
            }
            self.context.fallback_notice_sent = true;
        }

        let failure = bridge(
            &self.context.session_id,
            sink,
            source,
            frames,
            events.clone(),
            cancel.child_token(),
        )
        .await;

        if let Some(err) = failure {
            // Mid-session upstream failure is terminal for the session; the
            // audio context already consumed upstream cannot be replayed
            // against a different backend. The client reconnects instead.
            warn!(
                session_id = %self.context.session_id,
                backend = self.context.chosen_backend.as_deref().unwrap_or(""),
                kind = err.kind_str(),
                error = %err,
                "Session ended on upstream failure"
            );
            let _ = events
                .send(SpeechEvent::Error {
                    detail: "speech session interrupted".to_string(),
                })
                .await;
        }

        self.close();
        self.state
    }

    /// Attempt backends in registry order until one handshake succeeds.
    ///
    /// Each attempt gets the backend's own timeout. If the chosen backend is
    /// not the primary, a fallback notice is staged for delivery before any
    /// transcript.
    async fn connect_upstream(
        &mut self,
        ordering: &BackendOrdering<SpeechDescriptor>,
        connector: &dyn SpeechConnector,
        cancel: &CancellationToken,
    ) -> ConnectOutcome {
        let primary_name = ordering
            .primary()
            .map(|b| b.name.clone())
            .unwrap_or_default();
        let mut primary_failure: Option<&'static str> = None;

        for backend in ordering.iter() {
            let attempt = CallAttempt::begin("speech-handshake", &backend.name, backend.timeout);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(session_id = %self.context.session_id, "Session cancelled during connect");
                    return ConnectOutcome::Cancelled;
                }
                result = tokio::time::timeout(backend.timeout, connector.open(backend)) => {
                    match result {
                        Ok(inner) => inner,
                        Err(_) => Err(BackendError::Timeout(backend.timeout)),
                    }
                }
            };

            match result {
                Ok(channel) => {
                    attempt.success();
                    self.context.chosen_backend = Some(backend.name.clone());
                    if backend.name != primary_name {
                        self.pending_notice = Some(SpeechEvent::FallbackNotice {
                            from_backend: primary_name.clone(),
                            to_backend: backend.name.clone(),
                            reason: primary_failure.unwrap_or("unavailable").to_string(),
                        });
                    }
                    return ConnectOutcome::Connected(channel);
                }
                Err(err) if err.is_retriable() => {
                    if primary_failure.is_none() {
                        primary_failure = Some(err.kind_str());
                    }
                    attempt.retriable(&err);
                }
                Err(err) => {
                    attempt.fatal(&err);
                    return ConnectOutcome::Failed {
                        detail: "speech session could not be established",
                    };
                }
            }
        }

        warn!(
            session_id = %self.context.session_id,
            attempts = ordering.len(),
            "All speech backends exhausted"
        );
        ConnectOutcome::Failed {
            detail: "all speech backends are unavailable",
        }
    }
}

#[derive(Debug)]
enum UplinkEnd {
    /// End-of-stream delivered upstream; the downlink drains naturally.
    Finished,
    /// Client leg ended without an end-of-stream.
    ClientGone,
    Cancelled,
    Failed(BackendError),
}

#[derive(Debug)]
enum DownlinkEnd {
    /// Upstream closed its side; nothing more will arrive.
    UpstreamClosed,
    ClientGone,
    Cancelled,
    Failed(BackendError),
}

/// Run the two forwarding legs until the session ends.
///
/// Returns the upstream error when the bridge ended because the upstream leg
/// broke; `None` for every clean ending (client end-of-stream, either side
/// closing, cancellation).
async fn bridge(
    session_id: &str,
    sink: Box<dyn SpeechSink>,
    source: Box<dyn SpeechSource>,
    frames: mpsc::Receiver<ClientFrame>,
    events: mpsc::Sender<SpeechEvent>,
    cancel: CancellationToken,
) -> Option<BackendError> {
    let mut uplink = tokio::spawn(pump_uplink(frames, sink, cancel.clone()));
    let mut downlink = tokio::spawn(pump_downlink(source, events, cancel.clone()));

    let (up_end, down_end) = tokio::select! {
        up = &mut uplink => {
            let up = up.unwrap_or_else(|_| {
                UplinkEnd::Failed(BackendError::Other("uplink task failed".to_string()))
            });
            // A finished uplink lets the downlink drain the remaining
            // finals; any other ending stops it.
            if !matches!(up, UplinkEnd::Finished) {
                cancel.cancel();
            }
            let down = downlink.await.unwrap_or_else(|_| {
                DownlinkEnd::Failed(BackendError::Other("downlink task failed".to_string()))
            });
            (up, down)
        }
        down = &mut downlink => {
            cancel.cancel();
            let down = down.unwrap_or_else(|_| {
                DownlinkEnd::Failed(BackendError::Other("downlink task failed".to_string()))
            });
            let up = uplink.await.unwrap_or_else(|_| {
                UplinkEnd::Failed(BackendError::Other("uplink task failed".to_string()))
            });
            (up, down)
        }
    };

    debug!(
        session_id = %session_id,
        uplink = ?up_end,
        downlink = ?down_end,
        "Forwarding legs finished"
    );

    match (up_end, down_end) {
        (UplinkEnd::Failed(err), _) => Some(err),
        (_, DownlinkEnd::Failed(err)) => Some(err),
        _ => None,
    }
}

/// client -> upstream: forward audio, translate end-of-stream.
async fn pump_uplink(
    mut frames: mpsc::Receiver<ClientFrame>,
    mut sink: Box<dyn SpeechSink>,
    cancel: CancellationToken,
) -> UplinkEnd {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                sink.close().await;
                return UplinkEnd::Cancelled;
            }
            frame = frames.recv() => frame,
        };

        match frame {
            Some(ClientFrame::Audio(audio)) => {
                if let Err(err) = sink.send_audio(audio).await {
                    return UplinkEnd::Failed(err);
                }
            }
            Some(ClientFrame::EndOfStream) => {
                return match sink.finish().await {
                    Ok(()) => UplinkEnd::Finished,
                    Err(err) => UplinkEnd::Failed(err),
                };
            }
            None => {
                sink.close().await;
                return UplinkEnd::ClientGone;
            }
        }
    }
}

/// upstream -> client: translate recognition events.
async fn pump_downlink(
    mut source: Box<dyn SpeechSource>,
    events: mpsc::Sender<SpeechEvent>,
    cancel: CancellationToken,
) -> DownlinkEnd {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return DownlinkEnd::Cancelled,
            next = source.next() => next,
        };

        let event = match next {
            Ok(Some(Transcript::Partial(text))) => SpeechEvent::PartialTranscript { text },
            Ok(Some(Transcript::Final(text))) => SpeechEvent::FinalTranscript { text },
            Ok(None) => return DownlinkEnd::UpstreamClosed,
            Err(err) => return DownlinkEnd::Failed(err),
        };

        if events.send(event).await.is_err() {
            return DownlinkEnd::ClientGone;
        }
    }
}
