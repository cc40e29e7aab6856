//! Subscribes to `Link` events and owns one Cluster Watcher per registered
//! remote cluster.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{api::Api, runtime::watcher, ResourceExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use service_mirror_core::{LinkError, ProbeEvent};
use service_mirror_k8s_api::{kubeconfig_bytes, parse_link, remote_client_from_kubeconfig, Link, LocalApi};

use crate::cluster_watcher::{self, ClusterWatcherConfig, ClusterWatcherHandle};
use crate::metrics::IndexMetrics;

pub struct ConfigWatcherConfig {
    pub local: Arc<LocalApi>,
    pub probe_tx: mpsc::Sender<ProbeEvent>,
    pub requeue_limit: u32,
    pub repair_period: Duration,
    pub gc_period: Duration,
    pub metrics: IndexMetrics,
}

/// Owns the registry of live Cluster Watchers, keyed by their `Link`'s
/// object name (the credentials Secret and the target cluster name are
/// both reachable only through the Link, so the Link identifies the
/// registration uniquely even before it is parsed).
pub struct ConfigWatcher {
    config: ConfigWatcherConfig,
    watchers: Mutex<HashMap<String, ClusterWatcherHandle>>,
}

impl ConfigWatcher {
    pub fn new(config: ConfigWatcherConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            watchers: Mutex::new(HashMap::new()),
        })
    }

    /// Runs the Link watch loop until `stop` fires. On exit, every Cluster
    /// Watcher is stopped without deleting its mirrors: they are left in
    /// place for whichever controller instance takes over.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut links = self.config.local.watch_links().boxed();
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                next = links.next() => match next {
                    Some(Ok(watcher::Event::Apply(link))) | Some(Ok(watcher::Event::InitApply(link))) => {
                        self.clone().handle_apply(link).await;
                    }
                    Some(Ok(watcher::Event::Delete(link))) => {
                        self.handle_delete(&link.name_any()).await;
                    }
                    Some(Ok(watcher::Event::Init)) | Some(Ok(watcher::Event::InitDone)) => {}
                    Some(Err(error)) => warn!(%error, "link informer error, resync pending"),
                    None => break,
                },
            }
        }
        self.stop_all().await;
    }

    /// `watcher::Event::Apply` fires for both the initial create and every
    /// subsequent update — kube-rs has no separate Added/Modified variant —
    /// so an already-registered link is only ignored if its resource
    /// version hasn't moved. A changed resource version means credentials,
    /// the selector, or the gateway may have rotated: the existing watcher
    /// is stopped without cleaning up its mirrors (they stay valid) and the
    /// link is re-registered from scratch.
    #[instrument(skip(self, link), fields(link = %link.name_any()))]
    async fn handle_apply(self: Arc<Self>, link: Link) {
        let link_name = link.name_any();
        let incoming_rv = link.resource_version().unwrap_or_default();

        if let Some(existing_rv) = self
            .watchers
            .lock()
            .get(&link_name)
            .map(|h| h.link_resource_version().to_string())
        {
            if existing_rv == incoming_rv {
                debug!("link unchanged, ignoring");
                return;
            }
            if let Some(old) = self.watchers.lock().remove(&link_name) {
                info!(cluster = old.cluster_name(), "link changed, re-registering cluster watcher");
                old.stop(false).await;
            }
        }

        match self.register(&link).await {
            Ok(handle) => {
                info!(cluster = handle.cluster_name(), "registered cluster watcher");
                self.watchers.lock().insert(link_name, handle);
            }
            Err(error) => error!(%error, "failed to register link"),
        }
    }

    async fn register(&self, link: &Link) -> Result<ClusterWatcherHandle, LinkError> {
        let domain_link = parse_link(link)?;
        let link_name = link.name_any();
        let namespace = link.namespace().unwrap_or_default();

        if self
            .watchers
            .lock()
            .values()
            .any(|h| h.cluster_name() == domain_link.cluster_name)
        {
            return Err(LinkError::AlreadyRegistered(domain_link.cluster_name.clone()));
        }

        let secret_name = link.spec.cluster_credentials_secret.clone();
        let secret = Api::<Secret>::namespaced(self.config.local.client(), &namespace)
            .get(&secret_name)
            .await
            .map_err(|_| LinkError::MissingKubeconfig(secret_name.clone(), link_name.clone()))?;
        let kubeconfig = kubeconfig_bytes(link, &secret)?;
        let remote_client = remote_client_from_kubeconfig(&link_name, &secret_name, &kubeconfig).await?;

        let handle = cluster_watcher::start(ClusterWatcherConfig {
            cluster_name: domain_link.cluster_name.clone(),
            link: domain_link,
            link_resource_version: link.resource_version().unwrap_or_default(),
            remote_client,
            local: self.config.local.clone(),
            probe_tx: self.config.probe_tx.clone(),
            requeue_limit: self.config.requeue_limit,
            repair_period: self.config.repair_period,
            gc_period: self.config.gc_period,
            metrics: self.config.metrics.clone(),
        })
        .await;
        Ok(handle)
    }

    #[instrument(skip(self))]
    async fn handle_delete(&self, link_name: &str) {
        let handle = self.watchers.lock().remove(link_name);
        if let Some(handle) = handle {
            info!(cluster = handle.cluster_name(), "unregistering cluster watcher");
            handle.stop(true).await;
        }
    }

    async fn stop_all(&self) {
        let handles: Vec<_> = self.watchers.lock().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.stop(false).await;
        }
    }
}
