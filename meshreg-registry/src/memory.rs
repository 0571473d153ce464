//! In-memory service registry
//!
//! Holds services, instances and workloads pushed into it directly instead of
//! watching an external source of truth. Used for statically configured
//! registries and as a stand-in for real providers in tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use meshreg_core::models::{
    ClusterId, Event, Hostname, Labels, LabelsCollection, NetworkGateway, ProviderKind, Proxy, Service,
    ServiceHandler, ServiceInstance, WorkloadHandler, WorkloadInstance,
};
use meshreg_core::{Error, Result};

use crate::registry::ServiceRegistry;

#[derive(Default)]
struct State {
    /// Insertion ordered
    services: Vec<Arc<Service>>,
    /// Ordered by hostname so cross-service walks are deterministic
    instances: BTreeMap<Hostname, Vec<ServiceInstance>>,
    /// Keyed by "namespace/name"
    workloads: BTreeMap<String, WorkloadInstance>,
    /// Keyed by proxy IP
    proxy_labels: HashMap<String, Labels>,
    gateways: Vec<NetworkGateway>,
    /// When set, service queries fail with this message
    injected_error: Option<String>,
}

impl State {
    fn service(&self, hostname: &Hostname) -> Option<&Arc<Service>> {
        self.services.iter().find(|s| &s.hostname == hostname)
    }
}

/// Thread-safe registry backed by in-process maps
pub struct MemoryRegistry {
    cluster: ClusterId,
    provider: ProviderKind,
    state: RwLock<State>,
    synced: AtomicBool,
    service_handlers: RwLock<Vec<ServiceHandler>>,
    workload_handlers: RwLock<Vec<WorkloadHandler>>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new(cluster: impl Into<ClusterId>, provider: ProviderKind) -> Self {
        Self {
            cluster: cluster.into(),
            provider,
            state: RwLock::new(State::default()),
            synced: AtomicBool::new(false),
            service_handlers: RwLock::new(Vec::new()),
            workload_handlers: RwLock::new(Vec::new()),
        }
    }

    /// Add or replace a service (by hostname)
    pub fn add_service(&self, service: Service) {
        let service = Arc::new(service);
        let event = {
            let mut state = self.state.write();
            if let Some(existing) = state.services.iter_mut().find(|s| s.hostname == service.hostname) {
                *existing = service.clone();
                Event::Update
            } else {
                state.services.push(service.clone());
                Event::Add
            }
        };
        debug!(cluster = %self.cluster, hostname = %service.hostname, %event, "Service changed");
        self.notify_service(&service, event);
    }

    /// Remove a service and its instances; returns false if unknown
    pub fn remove_service(&self, hostname: &Hostname) -> bool {
        let removed = {
            let mut state = self.state.write();
            state.instances.remove(hostname);
            let pos = state.services.iter().position(|s| &s.hostname == hostname);
            pos.map(|i| state.services.remove(i))
        };
        match removed {
            Some(service) => {
                debug!(cluster = %self.cluster, %hostname, "Service removed");
                self.notify_service(&service, Event::Delete);
                true
            }
            None => false,
        }
    }

    pub fn add_instance(&self, instance: ServiceInstance) {
        let mut state = self.state.write();
        state
            .instances
            .entry(instance.service.hostname.clone())
            .or_default()
            .push(instance);
    }

    /// Add or replace a workload
    pub fn add_workload(&self, workload: WorkloadInstance) {
        let key = format!("{}/{}", workload.namespace, workload.name);
        let event = {
            let mut state = self.state.write();
            if state.workloads.insert(key, workload.clone()).is_some() {
                Event::Update
            } else {
                Event::Add
            }
        };
        self.notify_workload(&workload, event);
    }

    /// Remove a workload; returns false if unknown
    pub fn remove_workload(&self, namespace: &str, name: &str) -> bool {
        let removed = self.state.write().workloads.remove(&format!("{namespace}/{name}"));
        match removed {
            Some(workload) => {
                self.notify_workload(&workload, Event::Delete);
                true
            }
            None => false,
        }
    }

    /// Labels reported for the workload at `ip`
    pub fn set_proxy_labels(&self, ip: impl Into<String>, labels: Labels) {
        self.state.write().proxy_labels.insert(ip.into(), labels);
    }

    pub fn add_gateway(&self, gateway: NetworkGateway) {
        self.state.write().gateways.push(gateway);
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    /// Make service queries fail (`Some`) or succeed again (`None`)
    pub fn fail_services(&self, message: Option<String>) {
        self.state.write().injected_error = message;
    }

    fn notify_service(&self, service: &Service, event: Event) {
        let handlers = self.service_handlers.read().clone();
        for handler in handlers {
            handler(service, event);
        }
    }

    fn notify_workload(&self, workload: &WorkloadInstance, event: Event) {
        let handlers = self.workload_handlers.read().clone();
        for handler in handlers {
            handler(workload, event);
        }
    }

    fn check_injected_error(&self, state: &State) -> Result<()> {
        match &state.injected_error {
            Some(msg) => Err(Error::registry(format!("{}: {msg}", self.cluster))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    fn cluster(&self) -> ClusterId {
        self.cluster.clone()
    }

    fn provider(&self) -> ProviderKind {
        self.provider
    }

    fn services(&self) -> Result<Vec<Arc<Service>>> {
        let state = self.state.read();
        self.check_injected_error(&state)?;
        Ok(state.services.clone())
    }

    fn get_service(&self, hostname: &Hostname) -> Result<Option<Arc<Service>>> {
        let state = self.state.read();
        self.check_injected_error(&state)?;
        Ok(state.service(hostname).cloned())
    }

    fn network_gateways(&self) -> Vec<NetworkGateway> {
        self.state.read().gateways.clone()
    }

    fn instances_by_port(&self, service: &Service, port: u16, labels: &LabelsCollection) -> Vec<ServiceInstance> {
        let state = self.state.read();
        state
            .instances
            .get(&service.hostname)
            .map(|instances| {
                instances
                    .iter()
                    .filter(|i| i.service_port.port == port && labels.has_subset_of(&i.endpoint.labels))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn get_proxy_service_instances(&self, proxy: &Proxy) -> Vec<ServiceInstance> {
        let state = self.state.read();
        state
            .instances
            .values()
            .flatten()
            .filter(|i| proxy.ip_addresses.contains(&i.endpoint.address))
            .cloned()
            .collect()
    }

    fn get_proxy_workload_labels(&self, proxy: &Proxy) -> LabelsCollection {
        let state = self.state.read();
        for ip in &proxy.ip_addresses {
            if let Some(labels) = state.proxy_labels.get(ip) {
                return LabelsCollection::from(labels.clone());
            }
            if let Some(workload) = state.workloads.values().find(|w| &w.endpoint.address == ip) {
                return LabelsCollection::from(workload.endpoint.labels.clone());
            }
        }
        LabelsCollection::new()
    }

    fn service_accounts(&self, service: &Service, ports: &[u16]) -> Vec<String> {
        let state = self.state.read();
        let mut out: Vec<String> = state
            .service(&service.hostname)
            .map(|s| s.service_accounts.clone())
            .unwrap_or_default();

        if let Some(instances) = state.instances.get(&service.hostname) {
            out.extend(
                instances
                    .iter()
                    .filter(|i| ports.is_empty() || ports.contains(&i.service_port.port))
                    .filter(|i| !i.endpoint.service_account.is_empty())
                    .map(|i| i.endpoint.service_account.clone()),
            );
        }
        out
    }

    async fn run(&self, stop: CancellationToken) {
        self.set_synced(true);
        info!(cluster = %self.cluster, provider = %self.provider, "Memory registry running");
        stop.cancelled().await;
        info!(cluster = %self.cluster, provider = %self.provider, "Memory registry stopped");
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn append_service_handler(&self, handler: ServiceHandler) {
        self.service_handlers.write().push(handler);
    }

    fn append_workload_handler(&self, handler: WorkloadHandler) {
        self.workload_handlers.write().push(handler);
    }
}
