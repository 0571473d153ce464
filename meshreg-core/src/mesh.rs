//! Mesh-wide configuration and its live holder

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_TRUST_DOMAIN: &str = "cluster.local";

/// Mesh-wide settings consumed by the aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Primary trust domain of the mesh
    pub trust_domain: String,
    /// Trust domains treated as equivalent to `trust_domain`
    pub trust_domain_aliases: Vec<String>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            trust_domain: DEFAULT_TRUST_DOMAIN.to_string(),
            trust_domain_aliases: Vec::new(),
        }
    }
}

/// Live access to the current mesh config
///
/// Implementations may swap the config at any time; readers must not cache it.
#[cfg_attr(test, mockall::automock)]
pub trait MeshHolder: Send + Sync {
    fn mesh(&self) -> Option<Arc<MeshConfig>>;
}

/// Swappable in-memory mesh config holder
#[derive(Debug, Default)]
pub struct MeshWatcher {
    current: RwLock<Option<Arc<MeshConfig>>>,
}

impl MeshWatcher {
    #[must_use]
    pub fn new(config: Option<MeshConfig>) -> Self {
        Self {
            current: RwLock::new(config.map(Arc::new)),
        }
    }

    /// Replace the current config; subsequent `mesh()` calls observe it
    pub fn update(&self, config: Option<MeshConfig>) {
        let config = config.map(Arc::new);
        tracing::info!(
            trust_domain = config.as_ref().map_or("", |c| c.trust_domain.as_str()),
            aliases = config.as_ref().map_or(0, |c| c.trust_domain_aliases.len()),
            "Mesh config updated"
        );
        *self.current.write() = config;
    }
}

impl MeshHolder for MeshWatcher {
    fn mesh(&self) -> Option<Arc<MeshConfig>> {
        self.current.read().clone()
    }
}
