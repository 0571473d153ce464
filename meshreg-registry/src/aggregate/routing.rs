//! Proxy-scoped lookups routed by cluster affinity

use tracing::debug;

use meshreg_core::models::{ClusterId, LabelsCollection, Proxy, ServiceInstance};

use super::controller::Controller;
use crate::registry::ServiceRegistry;

/// Whether a registry cannot hold the proxy because it lives in another cluster
///
/// Non-Kubernetes registries are always searched, and so is every registry
/// when the proxy's cluster is unknown.
fn skip_registry_for_proxy(proxy_cluster: Option<&ClusterId>, registry: &dyn ServiceRegistry) -> bool {
    if !registry.provider().is_kubernetes() {
        return false;
    }
    proxy_cluster.is_some_and(|cluster| *cluster != registry.cluster())
}

impl Controller {
    /// Service instances co-located with `proxy`
    #[must_use]
    pub fn get_proxy_service_instances(&self, proxy: &Proxy) -> Vec<ServiceInstance> {
        let proxy_cluster = proxy.cluster_id();
        let mut out = Vec::new();

        for registry in self.get_registries() {
            if skip_registry_for_proxy(proxy_cluster, registry.as_ref()) {
                debug!(
                    registry_cluster = %registry.cluster(),
                    proxy = %proxy.id,
                    proxy_cluster = %proxy_cluster.map_or("", ClusterId::as_str),
                    "Not searching registry for proxy in another cluster"
                );
                continue;
            }
            out.extend(registry.get_proxy_service_instances(proxy));
        }

        out
    }

    /// Workload labels for `proxy`
    ///
    /// Unlike instance lookup this never unions results: a workload is
    /// assumed to live in exactly one registry. With an unknown cluster the
    /// first registry returning labels wins; otherwise only the first registry
    /// of the proxy's cluster is asked.
    #[must_use]
    pub fn get_proxy_workload_labels(&self, proxy: &Proxy) -> LabelsCollection {
        let proxy_cluster = proxy.cluster_id();

        for registry in self.get_registries() {
            match proxy_cluster {
                None => {
                    // Without a cluster hint the match may be the wrong workload
                    let labels = registry.get_proxy_workload_labels(proxy);
                    if !labels.is_empty() {
                        return labels;
                    }
                }
                Some(cluster) if *cluster == registry.cluster() => {
                    return registry.get_proxy_workload_labels(proxy);
                }
                Some(_) => {}
            }
        }

        LabelsCollection::new()
    }
}
