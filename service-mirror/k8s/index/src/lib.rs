//! The multicluster service-mirror controller's indexing half: the
//! client-go-style work queue, pure mirror-object construction, gateway
//! resolution, one Cluster Watcher per remote cluster, and the Config
//! Watcher that owns the registry of Cluster Watchers.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cluster_watcher;
pub mod config_watcher;
pub mod gateway;
pub mod metrics;
pub mod mirror;
pub mod queue;

pub use cluster_watcher::{ClusterWatcherConfig, ClusterWatcherHandle};
pub use config_watcher::{ConfigWatcher, ConfigWatcherConfig};
pub use metrics::IndexMetrics;
pub use queue::Queue;
