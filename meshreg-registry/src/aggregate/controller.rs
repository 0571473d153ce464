//! Registry collection and lifecycle

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meshreg_core::metrics;
use meshreg_core::models::{ClusterId, ProviderKind, ServiceHandler, WorkloadHandler};
use meshreg_core::MeshHolder;

use crate::registry::ServiceRegistry;

/// Options for building a [`Controller`]
#[derive(Default, Clone)]
pub struct Options {
    /// Source of trust domain aliases; read on every identity lookup
    pub mesh_holder: Option<Arc<dyn MeshHolder>>,
}

/// Aggregates data across many service registries
///
/// Registries are kept in insertion order. The first registry to report a
/// hostname provides the defaults for the merged service, so the first one
/// added acts as the primary cluster.
pub struct Controller {
    registries: RwLock<Vec<Arc<dyn ServiceRegistry>>>,
    pub(crate) mesh_holder: Option<Arc<dyn MeshHolder>>,
    running: AtomicBool,
}

impl Controller {
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            registries: RwLock::new(Vec::new()),
            mesh_holder: options.mesh_holder,
            running: AtomicBool::new(false),
        }
    }

    /// Append a registry; no de-duplication is performed
    ///
    /// If [`Controller::running`] is already true the caller must start the
    /// registry itself.
    pub fn add_registry(&self, registry: Arc<dyn ServiceRegistry>) {
        debug!(cluster = %registry.cluster(), provider = %registry.provider(), "Adding registry");
        self.registries.write().push(registry);
        metrics::REGISTRIES.inc();
    }

    /// Remove the first registry matching both `cluster` and `provider`
    ///
    /// Deleting an unknown registry is a no-op.
    pub fn delete_registry(&self, cluster: &ClusterId, provider: ProviderKind) {
        let snapshot = self.get_registries();
        if snapshot.is_empty() {
            warn!("Registry list is empty, nothing to delete");
            return;
        }

        // Match outside the lock, then remove that exact registry
        let target = snapshot
            .into_iter()
            .find(|r| &r.cluster() == cluster && r.provider() == provider);
        let removed = target.is_some_and(|target| {
            let mut registries = self.registries.write();
            match registries.iter().position(|r| Arc::ptr_eq(r, &target)) {
                Some(index) => {
                    registries.remove(index);
                    true
                }
                None => false,
            }
        });

        if !removed {
            warn!(%cluster, %provider, "Registry not found in the registries list, nothing to delete");
            return;
        }
        metrics::REGISTRIES.dec();
        info!(%cluster, %provider, "Registry has been deleted");
    }

    /// Snapshot of the registry list
    ///
    /// The copy is shallow: callers iterate it without holding the
    /// controller's lock, and each registry guards its own state.
    #[must_use]
    pub fn get_registries(&self) -> Vec<Arc<dyn ServiceRegistry>> {
        self.registries.read().clone()
    }

    /// Start every registered registry and wait for `stop`
    ///
    /// Each registry runs on its own task sharing `stop`. Registries added
    /// after this call are not started here.
    pub async fn run(&self, stop: CancellationToken) {
        for registry in self.get_registries() {
            let stop = stop.clone();
            tokio::spawn(async move {
                registry.run(stop).await;
            });
        }
        self.running.store(true, Ordering::SeqCst);
        info!("Registry aggregator started");

        stop.cancelled().await;
        info!("Registry aggregator terminated");
    }

    /// True once [`Controller::run`] has started
    #[must_use]
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True when every registered registry has synced
    #[must_use]
    pub fn has_synced(&self) -> bool {
        for registry in self.get_registries() {
            if !registry.has_synced() {
                debug!(cluster = %registry.cluster(), "Registry is syncing");
                return false;
            }
        }
        true
    }

    /// Register `handler` with every current registry
    pub fn append_service_handler(&self, handler: ServiceHandler) {
        for registry in self.get_registries() {
            registry.append_service_handler(handler.clone());
        }
    }

    /// Register `handler` with every current registry
    pub fn append_workload_handler(&self, handler: WorkloadHandler) {
        for registry in self.get_registries() {
            registry.append_workload_handler(handler.clone());
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        metrics::REGISTRIES.sub(self.registries.get_mut().len() as i64);
    }
}
