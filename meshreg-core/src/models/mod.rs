pub mod id;
pub mod instance;
pub mod labels;
pub mod proxy;
pub mod service;

pub use id::{ClusterId, Hostname, ProviderKind};
pub use instance::{
    Endpoint, Event, NetworkGateway, ServiceHandler, ServiceInstance, WorkloadHandler, WorkloadInstance,
};
pub use labels::{Labels, LabelsCollection};
pub use proxy::{NodeMetadata, Proxy};
pub use service::{ClusterVips, Port, Protocol, Resolution, Service};
