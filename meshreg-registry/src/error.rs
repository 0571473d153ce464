//! Error types for registry aggregation

use thiserror::Error;

use meshreg_core::models::{ClusterId, ProviderKind};

/// A query that failed against one registry
#[derive(Debug, Error)]
#[error("registry {cluster}/{provider}: {source}")]
pub struct RegistryFailure {
    pub cluster: ClusterId,
    pub provider: ProviderKind,
    #[source]
    pub source: meshreg_core::Error,
}

/// Failures accumulated while walking every registry
///
/// Always returned next to whatever partial result the healthy registries
/// produced; callers decide whether that is good enough.
#[derive(Debug, Default, Error)]
#[error("{} registries failed: {}", .failures.len(), join(.failures))]
pub struct AggregateError {
    pub failures: Vec<RegistryFailure>,
}

fn join(failures: &[RegistryFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AggregateError {
    pub fn push(&mut self, failure: RegistryFailure) {
        self.failures.push(failure);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// `None` when nothing failed
    #[must_use]
    pub fn into_option(self) -> Option<Self> {
        if self.failures.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}
