//! Logical services and their per-cluster virtual IPs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::id::{ClusterId, Hostname};
use super::labels::Labels;

/// Per-cluster virtual IP mapping
///
/// This is the surface cross-cluster merging writes to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterVips(BTreeMap<ClusterId, Vec<String>>);

impl ClusterVips {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Addresses recorded for a cluster (empty if none)
    #[must_use]
    pub fn addresses_for(&self, cluster: &ClusterId) -> &[String] {
        self.0.get(cluster).map_or(&[], Vec::as_slice)
    }

    /// Replace the addresses recorded for a cluster
    pub fn set_addresses_for(&mut self, cluster: ClusterId, addresses: Vec<String>) {
        self.0.insert(cluster, addresses);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Application protocol of a service port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Http,
    Http2,
    Grpc,
    Https,
    Tls,
    Udp,
}

/// A named service port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Port {
    #[must_use]
    pub fn new(name: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            port,
            protocol,
        }
    }
}

/// How the proxy resolves endpoints for a service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    ClientSideLb,
    DnsLb,
    Passthrough,
}

/// A logical service, keyed by hostname for merge purposes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    pub hostname: Hostname,
    pub namespace: String,
    /// Default virtual IP of the service in its own cluster
    pub address: String,
    pub cluster_vips: ClusterVips,
    pub ports: Vec<Port>,
    /// Identities declared on the service itself (e.g. for external services)
    pub service_accounts: Vec<String>,
    pub mesh_external: bool,
    pub resolution: Resolution,
    pub labels: Labels,
}

impl Service {
    /// Build a service whose VIP map already holds its own cluster address
    #[must_use]
    pub fn new(hostname: impl Into<Hostname>, address: impl Into<String>, cluster: ClusterId) -> Self {
        let address = address.into();
        let mut cluster_vips = ClusterVips::new();
        if !cluster.is_empty() {
            cluster_vips.set_addresses_for(cluster, vec![address.clone()]);
        }
        Self {
            hostname: hostname.into(),
            address,
            cluster_vips,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ports(mut self, ports: Vec<Port>) -> Self {
        self.ports = ports;
        self
    }

    #[must_use]
    pub fn with_service_accounts(mut self, accounts: Vec<String>) -> Self {
        self.service_accounts = accounts;
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Look up a port by number
    #[must_use]
    pub fn port(&self, number: u16) -> Option<&Port> {
        self.ports.iter().find(|p| p.port == number)
    }
}
