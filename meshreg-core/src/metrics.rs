//! Prometheus metrics for the registry aggregator

use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_with_registry, Encoder, IntCounterVec, IntGauge,
    Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Registries held by all live controllers; each adds and removes its own share
pub static REGISTRIES: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "aggregate_registries",
        "Number of service registries held across all aggregators in the process",
        REGISTRY.clone()
    )
    .expect("Failed to register REGISTRIES")
});

/// Failed registry queries, by cluster, provider and operation
pub static REGISTRY_ERRORS: std::sync::LazyLock<IntCounterVec> = std::sync::LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "aggregate_registry_errors_total",
        "Total number of failed registry queries",
        &["cluster", "provider", "operation"],
        REGISTRY.clone()
    )
    .expect("Failed to register REGISTRY_ERRORS")
});

/// Cross-cluster service merges performed
pub static SERVICE_MERGES: std::sync::LazyLock<IntCounterVec> = std::sync::LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "aggregate_service_merges_total",
        "Total number of cross-cluster service merges",
        &["cluster"],
        REGISTRY.clone()
    )
    .expect("Failed to register SERVICE_MERGES")
});

/// Render all metrics in the Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
