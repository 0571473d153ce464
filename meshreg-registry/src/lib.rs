pub mod aggregate;
pub mod error;
pub mod memory;
pub mod registry;

pub use aggregate::{Controller, Options};
pub use error::{AggregateError, RegistryFailure};
pub use memory::MemoryRegistry;
pub use registry::ServiceRegistry;
