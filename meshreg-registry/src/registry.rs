//! The capability set every service registry exposes to the aggregator

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use meshreg_core::models::{
    ClusterId, Hostname, LabelsCollection, NetworkGateway, ProviderKind, Proxy, Service, ServiceHandler,
    ServiceInstance, WorkloadHandler,
};
use meshreg_core::Result;

/// A source of service and workload data for one cluster and one provider
///
/// Implementations own their state and must be internally thread-safe: the
/// aggregator calls them concurrently from many tasks without holding any
/// lock of its own.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Cluster this registry represents
    fn cluster(&self) -> ClusterId;

    /// Technology backing this registry
    fn provider(&self) -> ProviderKind;

    /// All services known to this registry
    fn services(&self) -> Result<Vec<Arc<Service>>>;

    /// Service by hostname, `None` if unknown
    fn get_service(&self, hostname: &Hostname) -> Result<Option<Arc<Service>>>;

    /// Cross-network gateways known to this registry
    fn network_gateways(&self) -> Vec<NetworkGateway>;

    /// Instances of `service` on `port` whose labels match any set in `labels`
    fn instances_by_port(&self, service: &Service, port: u16, labels: &LabelsCollection) -> Vec<ServiceInstance>;

    /// Service instances co-located with `proxy`
    fn get_proxy_service_instances(&self, proxy: &Proxy) -> Vec<ServiceInstance>;

    /// Labels of the workload running `proxy`
    fn get_proxy_workload_labels(&self, proxy: &Proxy) -> LabelsCollection;

    /// SPIFFE identities backing `service` on `ports` (all ports when empty)
    fn service_accounts(&self, service: &Service, ports: &[u16]) -> Vec<String>;

    /// Watch the source of truth until `stop` is cancelled
    async fn run(&self, stop: CancellationToken);

    /// Whether the registry's view reflects its source of truth
    fn has_synced(&self) -> bool;

    fn append_service_handler(&self, handler: ServiceHandler);

    fn append_workload_handler(&self, handler: WorkloadHandler);
}
