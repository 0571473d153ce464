//! Aggregate view over many service registries
//!
//! The [`Controller`] holds an ordered list of registries and answers every
//! discovery query by walking a snapshot of that list:
//! - services are merged across Kubernetes clusters by hostname
//! - proxy lookups are routed by the proxy's cluster affinity
//! - service identities are unioned and expanded with trust domain aliases
//!
//! Nothing is cached: each call recomputes its result from registry state.

mod controller;
mod identity;
mod routing;
mod services;

pub use controller::{Controller, Options};
