//! Cross-cluster service merging
//!
//! Kubernetes services sharing a hostname are folded into one service whose
//! cluster VIP map covers every contributing cluster. Services from any other
//! provider pass through untouched, even on hostname collisions.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use meshreg_core::metrics;
use meshreg_core::models::{Hostname, LabelsCollection, NetworkGateway, Service, ServiceInstance};

use super::controller::Controller;
use crate::error::{AggregateError, RegistryFailure};
use crate::registry::ServiceRegistry;

impl Controller {
    /// All services across all registries
    ///
    /// A failing registry is skipped and reported in the returned error; the
    /// list still holds what the other registries produced.
    #[must_use]
    pub fn services(&self) -> (Vec<Arc<Service>>, Option<AggregateError>) {
        // Position in `services` of the canonical entry for each hostname
        let mut index: HashMap<Hostname, usize> = HashMap::new();
        let mut services: Vec<Arc<Service>> = Vec::new();
        let mut errs = AggregateError::default();

        for registry in self.get_registries() {
            let svcs = match registry.services() {
                Ok(svcs) => svcs,
                Err(e) => {
                    record_failure(&mut errs, registry.as_ref(), "services", e);
                    continue;
                }
            };

            if !registry.provider().is_kubernetes() {
                services.extend(svcs);
                continue;
            }

            for svc in svcs {
                match index.get(&svc.hostname) {
                    Some(&pos) => {
                        // Seen before, so this copy comes from another cluster
                        merge_service(Arc::make_mut(&mut services[pos]), &svc, registry.as_ref());
                    }
                    None => {
                        index.insert(svc.hostname.clone(), services.len());
                        services.push(svc);
                    }
                }
            }
        }

        (services, errs.into_option())
    }

    /// Service by hostname, merged across Kubernetes registries
    ///
    /// A hit in a non-Kubernetes registry is returned as-is without looking
    /// further.
    #[must_use]
    pub fn get_service(&self, hostname: &Hostname) -> (Option<Arc<Service>>, Option<AggregateError>) {
        let mut out: Option<Arc<Service>> = None;
        let mut errs = AggregateError::default();

        for registry in self.get_registries() {
            let svc = match registry.get_service(hostname) {
                Ok(Some(svc)) => svc,
                Ok(None) => continue,
                Err(e) => {
                    record_failure(&mut errs, registry.as_ref(), "get_service", e);
                    continue;
                }
            };

            if !registry.provider().is_kubernetes() {
                return (Some(svc), None);
            }

            match out.as_mut() {
                // make_mut clones before the first write, leaving the registry's copy alone
                Some(merged) => merge_service(Arc::make_mut(merged), &svc, registry.as_ref()),
                None => out = Some(svc),
            }
        }

        (out, errs.into_option())
    }

    /// Network gateways from every registry, in registry order
    #[must_use]
    pub fn network_gateways(&self) -> Vec<NetworkGateway> {
        self.get_registries()
            .iter()
            .flat_map(|r| r.network_gateways())
            .collect()
    }

    /// Instances of `service` on `port` matching any of `labels`
    ///
    /// An empty label collection matches every instance.
    #[must_use]
    pub fn instances_by_port(&self, service: &Service, port: u16, labels: &LabelsCollection) -> Vec<ServiceInstance> {
        self.get_registries()
            .iter()
            .flat_map(|r| r.instances_by_port(service, port, labels))
            .collect()
    }
}

/// Record `src`'s address for the source registry's cluster in `dst`
///
/// Kubernetes addresses always win; any other provider only fills a cluster
/// with no address yet.
pub(crate) fn merge_service(dst: &mut Service, src: &Service, src_registry: &dyn ServiceRegistry) {
    let cluster = src_registry.cluster();
    if src_registry.provider().is_kubernetes() || dst.cluster_vips.addresses_for(&cluster).is_empty() {
        debug!(hostname = %dst.hostname, %cluster, address = %src.address, "Merging cluster VIP");
        metrics::SERVICE_MERGES.with_label_values(&[cluster.as_str()]).inc();
        dst.cluster_vips.set_addresses_for(cluster, vec![src.address.clone()]);
    }
}

fn record_failure(errs: &mut AggregateError, registry: &dyn ServiceRegistry, operation: &str, error: meshreg_core::Error) {
    let cluster = registry.cluster();
    let provider = registry.provider();
    warn!(%cluster, %provider, operation, error = %error, "Registry query failed");
    metrics::REGISTRY_ERRORS
        .with_label_values(&[cluster.as_str(), provider.as_str(), operation])
        .inc();
    errs.push(RegistryFailure {
        cluster,
        provider,
        source: error,
    });
}
