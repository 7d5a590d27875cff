//! One-shot completion calls with ordered backend fallback

use std::sync::Arc;

use crate::backend::completion::{CompletionBackend, CompletionRequest, CompletionResponse};
use crate::backend::descriptor::ProtocolKind;
use crate::backend::registry::BackendRegistry;
use crate::backend::OpenAiCompatBackend;
use crate::error::{AppError, BackendError, Result};
use crate::router::attempt::CallAttempt;

/// Routes each completion call through the configured backends in order.
///
/// Exactly one call is issued per backend, bound by that backend's own
/// timeout. A retriable failure escalates to the next backend; a fatal
/// failure propagates immediately. The router holds no mutable state and is
/// freely shared across tasks.
pub struct CompletionRouter {
    backends: Vec<Arc<dyn CompletionBackend>>,
}

impl CompletionRouter {
    pub fn new(backends: Vec<Arc<dyn CompletionBackend>>) -> Self {
        Self { backends }
    }

    /// Build HTTP clients for every completion backend in the registry.
    pub fn from_registry(registry: &BackendRegistry) -> Result<Self> {
        let backends = registry
            .completion()
            .iter()
            .map(|descriptor| {
                OpenAiCompatBackend::new(descriptor.clone())
                    .map(|backend| Arc::new(backend) as Arc<dyn CompletionBackend>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(backends))
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    fn resolve_order(&self, preferred: Option<&str>) -> Result<Vec<Arc<dyn CompletionBackend>>> {
        match preferred {
            None => Ok(self.backends.clone()),
            Some(name) => {
                let pinned = self
                    .backends
                    .iter()
                    .find(|b| b.name() == name)
                    .cloned()
                    .ok_or_else(|| AppError::Backend {
                        backend: name.to_string(),
                        source: BackendError::InvalidArgument(format!(
                            "unknown completion backend '{}'",
                            name
                        )),
                    })?;
                let mut order = Vec::with_capacity(self.backends.len());
                order.push(pinned);
                order.extend(
                    self.backends
                        .iter()
                        .filter(|b| b.name() != name)
                        .cloned(),
                );
                Ok(order)
            }
        }
    }

    /// Call backends in order until one succeeds.
    ///
    /// Returns the response together with the name of the backend that
    /// produced it. Each backend's timeout is independent wall clock time for
    /// that attempt alone; a slow primary does not shrink the standby's
    /// allowance. When every backend fails retriably the error is
    /// [`AppError::AllBackendsExhausted`], distinct from a single fatal
    /// failure.
    pub async fn call_with_fallback(
        &self,
        request: &CompletionRequest,
        preferred: Option<&str>,
    ) -> Result<(CompletionResponse, String)> {
        let order = self.resolve_order(preferred)?;
        if order.is_empty() {
            return Err(AppError::InvalidConfig(
                "no completion backends configured".to_string(),
            ));
        }

        let mut failures = Vec::with_capacity(order.len());
        for backend in &order {
            let attempt = CallAttempt::begin("completion", backend.name(), backend.timeout());
            let outcome = match tokio::time::timeout(backend.timeout(), backend.complete(request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(backend.timeout())),
            };

            match outcome {
                Ok(response) => {
                    attempt.success();
                    return Ok((response, backend.name().to_string()));
                }
                Err(err) if err.is_retriable() => {
                    failures.push(format!("{}: {}", backend.name(), err.kind_str()));
                    attempt.retriable(&err);
                }
                Err(err) => {
                    attempt.fatal(&err);
                    return Err(AppError::Backend {
                        backend: backend.name().to_string(),
                        source: err,
                    });
                }
            }
        }

        Err(AppError::AllBackendsExhausted {
            kind: ProtocolKind::Completion,
            attempts: order.len(),
            detail: failures.join("; "),
        })
    }
}
