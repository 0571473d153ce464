pub mod config;
pub mod error;
pub mod logging;
pub mod mesh;
pub mod metrics;
pub mod models;
pub mod spiffe;

pub use config::Config;
pub use error::{Error, Result};
pub use mesh::{MeshConfig, MeshHolder, MeshWatcher};
