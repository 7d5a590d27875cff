//! Immutable ordered backend registry

use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::descriptor::{BackendEntry, CompletionDescriptor, SpeechDescriptor};
use crate::config::Settings;

/// Ordered sequence of backends sharing one protocol kind.
///
/// Index 0 is the primary; later entries are fallbacks in priority order.
/// The ordering is built once at startup and never mutated, so it can be
/// shared across tasks without locking.
#[derive(Debug)]
pub struct BackendOrdering<T> {
    entries: Vec<Arc<T>>,
}

impl<T: BackendEntry> BackendOrdering<T> {
    pub fn new(entries: Vec<Arc<T>>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The first backend in priority order, if any is configured.
    pub fn primary(&self) -> Option<&Arc<T>> {
        self.entries.first()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<T>> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    /// Resolve the attempt order for one call or session.
    ///
    /// With no preference this is the configured order. A preferred backend
    /// moves to the front, followed by the remaining entries in configured
    /// order. Returns `None` when the preferred name is not registered.
    pub fn resolve_order(&self, preferred: Option<&str>) -> Option<Vec<Arc<T>>> {
        match preferred {
            None => Some(self.entries.clone()),
            Some(name) => {
                let pinned = self.get(name)?.clone();
                let mut order = Vec::with_capacity(self.entries.len());
                order.push(pinned);
                order.extend(
                    self.entries
                        .iter()
                        .filter(|e| e.name() != name)
                        .cloned(),
                );
                Some(order)
            }
        }
    }
}

/// Registry holding one ordering per protocol kind.
///
/// Built from configuration at startup; backends whose credentials cannot be
/// resolved are skipped with a warning rather than failing the whole process,
/// so a missing standby key degrades capacity instead of availability.
#[derive(Debug)]
pub struct BackendRegistry {
    completion: BackendOrdering<CompletionDescriptor>,
    speech: BackendOrdering<SpeechDescriptor>,
}

impl BackendRegistry {
    pub fn from_settings(settings: &Settings) -> Self {
        let inherited_model = settings
            .completion
            .iter()
            .filter(|c| c.enabled)
            .find_map(|c| c.model.clone().filter(|m| !m.trim().is_empty()));

        let mut completion = Vec::new();
        for config in &settings.completion {
            match CompletionDescriptor::from_config(config, inherited_model.as_deref()) {
                Ok(descriptor) => {
                    info!(
                        backend = %descriptor.name,
                        model = %descriptor.model,
                        timeout_ms = descriptor.timeout.as_millis() as u64,
                        "Registered completion backend"
                    );
                    completion.push(Arc::new(descriptor));
                }
                Err(reason) => {
                    warn!(backend = %config.name, reason = %reason, "Skipping completion backend");
                }
            }
        }

        let mut speech = Vec::new();
        for config in &settings.speech {
            match SpeechDescriptor::from_config(config) {
                Ok(descriptor) => {
                    info!(
                        backend = %descriptor.name,
                        dialect = %descriptor.dialect,
                        timeout_ms = descriptor.timeout.as_millis() as u64,
                        "Registered speech backend"
                    );
                    speech.push(Arc::new(descriptor));
                }
                Err(reason) => {
                    warn!(backend = %config.name, reason = %reason, "Skipping speech backend");
                }
            }
        }

        Self {
            completion: BackendOrdering::new(completion),
            speech: BackendOrdering::new(speech),
        }
    }

    pub fn completion(&self) -> &BackendOrdering<CompletionDescriptor> {
        &self.completion
    }

    pub fn speech(&self) -> &BackendOrdering<SpeechDescriptor> {
        &self.speech
    }
}
