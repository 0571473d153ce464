use serde::{Deserialize, Serialize};

use super::id::ClusterId;
use super::labels::Labels;

/// Metadata a proxy reports about itself on connect
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMetadata {
    pub cluster_id: ClusterId,
    pub network: String,
    pub labels: Labels,
}

/// A connected data-plane proxy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Proxy {
    pub id: String,
    pub ip_addresses: Vec<String>,
    pub metadata: Option<NodeMetadata>,
}

impl Proxy {
    #[must_use]
    pub fn new(id: impl Into<String>, ip_addresses: Vec<String>) -> Self {
        Self {
            id: id.into(),
            ip_addresses,
            ..Self::default()
        }
    }

    /// Pin the proxy to a cluster
    #[must_use]
    pub fn in_cluster(mut self, cluster: impl Into<ClusterId>) -> Self {
        self.metadata.get_or_insert_with(NodeMetadata::default).cluster_id = cluster.into();
        self
    }

    /// Cluster affinity hint; `None` when metadata is missing or the cluster is empty
    #[must_use]
    pub fn cluster_id(&self) -> Option<&ClusterId> {
        self.metadata
            .as_ref()
            .map(|m| &m.cluster_id)
            .filter(|id| !id.is_empty())
    }
}
