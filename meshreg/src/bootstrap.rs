//! Build the aggregator from configuration

use std::sync::Arc;
use tracing::info;

use meshreg_core::config::RegistryConfig;
use meshreg_core::{Config, MeshHolder, MeshWatcher};
use meshreg_registry::{Controller, MemoryRegistry, Options};

/// Create a static registry holding the configured services and gateways
pub fn build_registry(config: &RegistryConfig) -> Arc<MemoryRegistry> {
    let registry = MemoryRegistry::new(config.cluster_id.clone(), config.provider);
    for service in &config.services {
        let mut service = service.clone();
        // Kubernetes services always know their own cluster VIP
        if config.provider.is_kubernetes() && service.cluster_vips.addresses_for(&config.cluster_id).is_empty() {
            service
                .cluster_vips
                .set_addresses_for(config.cluster_id.clone(), vec![service.address.clone()]);
        }
        registry.add_service(service);
    }
    for gateway in &config.gateways {
        registry.add_gateway(gateway.clone());
    }
    Arc::new(registry)
}

/// Create the controller and register every configured registry in order
pub fn build_controller(config: &Config, mesh: Arc<MeshWatcher>) -> Controller {
    let controller = Controller::new(Options {
        mesh_holder: Some(mesh as Arc<dyn MeshHolder>),
    });

    for registry_config in &config.registries {
        controller.add_registry(build_registry(registry_config));
        info!(
            cluster = %registry_config.cluster_id,
            provider = %registry_config.provider,
            services = registry_config.services.len(),
            "Registry configured"
        );
    }

    controller
}
