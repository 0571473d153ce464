use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::mesh::MeshConfig;
use crate::spiffe;
use crate::models::{ClusterId, NetworkGateway, ProviderKind, Service};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub mesh: MeshConfig,
    pub aggregator: AggregatorConfig,
    pub registries: Vec<RegistryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// How often the daemon logs a summary of the merged view
    pub report_interval_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 30,
        }
    }
}

/// A statically configured registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub cluster_id: ClusterId,
    pub provider: ProviderKind,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub gateways: Vec<NetworkGateway>,
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (MESHREG_LOGGING__LEVEL, etc.)
        builder = builder.add_source(
            Environment::with_prefix("MESHREG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check the configuration, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            errors.push(format!("logging.level: invalid level '{}'", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format: expected 'json' or 'pretty', got '{}'",
                self.logging.format
            ));
        }

        if self.mesh.trust_domain.is_empty() {
            errors.push("mesh.trust_domain: must not be empty".to_string());
        } else if let Err(e) = spiffe::validate_trust_domain(&self.mesh.trust_domain) {
            errors.push(format!("mesh.trust_domain: {e}"));
        }
        for (i, alias) in self.mesh.trust_domain_aliases.iter().enumerate() {
            if let Err(e) = spiffe::validate_trust_domain(alias) {
                errors.push(format!("mesh.trust_domain_aliases[{i}]: {e}"));
            }
        }

        if self.aggregator.report_interval_secs == 0 {
            errors.push("aggregator.report_interval_secs: must be greater than 0".to_string());
        }

        // The aggregator does not de-duplicate registries, so catch it here
        let mut seen = HashSet::new();
        for (i, registry) in self.registries.iter().enumerate() {
            if registry.provider.is_kubernetes() && registry.cluster_id.is_empty() {
                errors.push(format!("registries[{i}]: kubernetes registry requires a cluster_id"));
            }
            if !seen.insert((registry.cluster_id.clone(), registry.provider)) {
                errors.push(format!(
                    "registries[{i}]: duplicate registry {}/{}",
                    registry.cluster_id, registry.provider
                ));
            }
            for svc in &registry.services {
                if svc.hostname.as_str().is_empty() {
                    errors.push(format!("registries[{i}]: service without hostname"));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
