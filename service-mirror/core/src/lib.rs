//! Domain types shared by the multicluster service-mirror controller:
//! `Link`/`ProbeSpec`/`GatewaySpec`, the reconciler's event enums, label and
//! annotation constants, and the crate's error taxonomy.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;
pub mod events;
pub mod gateway;
pub mod labels;
pub mod link;
#[cfg(test)]
mod tests;

pub use error::{ApiError, LinkError, ReconcileError};
pub use events::{ClusterEvent, ProbeEvent};
pub use gateway::GatewaySpec;
pub use link::{Link, ProbeSpec};
