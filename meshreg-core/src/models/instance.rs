//! Service instances, workloads and network gateways

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::id::ClusterId;
use super::labels::Labels;
use super::service::{Port, Service};

/// A single network endpoint backing a service port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub address: String,
    pub endpoint_port: u16,
    pub labels: Labels,
    /// SPIFFE identity of the workload
    pub service_account: String,
    pub network: String,
    pub cluster_id: ClusterId,
}

/// An endpoint bound to a service port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub service: Arc<Service>,
    pub service_port: Port,
    pub endpoint: Endpoint,
}

/// A workload not directly owned by a service (e.g. a VM or a pod)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadInstance {
    pub name: String,
    pub namespace: String,
    pub endpoint: Endpoint,
    /// Service port name to workload port
    pub port_map: BTreeMap<String, u16>,
}

/// A gateway through which a remote network is reachable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkGateway {
    pub network: String,
    pub cluster: ClusterId,
    pub address: String,
    pub port: u16,
}

/// Registry change notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Add,
    Update,
    Delete,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Callback for service changes
pub type ServiceHandler = Arc<dyn Fn(&Service, Event) + Send + Sync>;

/// Callback for workload changes
pub type WorkloadHandler = Arc<dyn Fn(&WorkloadInstance, Event) + Send + Sync>;
