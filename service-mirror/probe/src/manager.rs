//! Owns one worker per probed gateway and multiplexes `ProbeEvent`s from
//! every Cluster Watcher onto that worker set.
//!
//! A gateway can be shared by mirrors from more than one mirrored
//! service, so workers are reference-counted by the set of paired
//! `(namespace, name)` mirrors rather than torn down on the first
//! `MirroredServiceUnpaired`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use service_mirror_core::{gateway::probe_key, GatewaySpec, ProbeEvent};

use crate::metrics::{ManagerEventLabels, ProbeMetrics};
use crate::worker;

struct WorkerEntry {
    cluster_name: String,
    gateway_tx: watch::Sender<GatewaySpec>,
    stop_tx: watch::Sender<bool>,
    paired: HashSet<(String, String)>,
    task: JoinHandle<()>,
}

pub struct ProbeManager {
    client: reqwest::Client,
    metrics: ProbeMetrics,
    workers: HashMap<String, WorkerEntry>,
}

impl ProbeManager {
    pub fn new(metrics: ProbeMetrics, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            metrics,
            workers: HashMap::new(),
        }
    }

    /// Drains `events` until the channel is closed, then stops every
    /// remaining worker before returning.
    pub async fn run(mut self, mut events: mpsc::Receiver<ProbeEvent>) {
        while let Some(event) = events.recv().await {
            self.metrics
                .manager_dequeues_total
                .get_or_create(&ManagerEventLabels {
                    event_type: event.kind().to_string(),
                })
                .inc();
            self.handle(event).await;
        }
        self.stop_all().await;
    }

    async fn handle(&mut self, event: ProbeEvent) {
        match event {
            ProbeEvent::MirroredServicePaired {
                service_name,
                service_namespace,
                gateway,
            } => self.handle_paired(service_name, service_namespace, gateway),
            ProbeEvent::MirroredServiceUnpaired {
                service_name,
                service_namespace,
                gateway_name,
                gateway_namespace,
                cluster_name,
            } => {
                self.handle_unpaired(
                    service_name,
                    service_namespace,
                    gateway_name,
                    gateway_namespace,
                    cluster_name,
                )
                .await
            }
            ProbeEvent::GatewayUpdated { gateway } => self.handle_gateway_updated(gateway),
            ProbeEvent::ClusterNotRegistered { cluster_name } => {
                self.handle_cluster_not_registered(&cluster_name).await
            }
        }
    }

    #[instrument(skip(self, gateway), fields(gateway = %gateway.name, cluster = %gateway.cluster_name))]
    fn handle_paired(&mut self, service_name: String, service_namespace: String, gateway: GatewaySpec) {
        let key = gateway.probe_key();
        let entry = self.workers.entry(key).or_insert_with(|| {
            let (gateway_tx, gateway_rx) = watch::channel(gateway.clone());
            let (stop_tx, stop_rx) = watch::channel(false);
            let task = worker::spawn(self.client.clone(), gateway_rx, stop_rx, self.metrics.clone());
            info!("started probe worker");
            WorkerEntry {
                cluster_name: gateway.cluster_name.clone(),
                gateway_tx,
                stop_tx,
                paired: HashSet::new(),
                task,
            }
        });
        entry.paired.insert((service_namespace, service_name));
    }

    #[instrument(skip(self))]
    async fn handle_unpaired(
        &mut self,
        service_name: String,
        service_namespace: String,
        gateway_name: String,
        gateway_namespace: String,
        cluster_name: String,
    ) {
        let key = probe_key(&gateway_namespace, &gateway_name, &cluster_name);
        let Some(entry) = self.workers.get_mut(&key) else {
            return;
        };
        entry.paired.remove(&(service_namespace, service_name));
        if entry.paired.is_empty() {
            if let Some(entry) = self.workers.remove(&key) {
                stop(entry).await;
                info!("stopped probe worker, no mirrors remain paired");
            }
        }
    }

    fn handle_gateway_updated(&mut self, gateway: GatewaySpec) {
        let key = gateway.probe_key();
        if let Some(entry) = self.workers.get(&key) {
            let _ = entry.gateway_tx.send(gateway);
        }
    }

    #[instrument(skip(self))]
    async fn handle_cluster_not_registered(&mut self, cluster_name: &str) {
        let keys: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, entry)| entry.cluster_name == cluster_name)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            if let Some(entry) = self.workers.remove(&key) {
                stop(entry).await;
            }
        }
        info!("stopped all probe workers for unregistered cluster");
    }

    async fn stop_all(&mut self) {
        for (_, entry) in self.workers.drain() {
            stop(entry).await;
        }
    }
}

async fn stop(entry: WorkerEntry) {
    let _ = entry.stop_tx.send(true);
    let _ = entry.task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_mirror_core::ProbeSpec;
    use std::time::Duration;

    fn gateway(cluster_name: &str) -> GatewaySpec {
        GatewaySpec {
            name: "linkerd-gateway".to_string(),
            namespace: "linkerd-multicluster".to_string(),
            cluster_name: cluster_name.to_string(),
            addresses: vec![],
            incoming_port: 4143,
            resource_version: "1".to_string(),
            identity: None,
            probe_spec: ProbeSpec {
                path: "/live".to_string(),
                port: 4191,
                period: Duration::from_millis(50),
            },
        }
    }

    #[tokio::test]
    async fn paired_then_unpaired_removes_worker() {
        let metrics = ProbeMetrics::default();
        let mut manager = ProbeManager::new(metrics, Duration::from_secs(1));
        let gw = gateway("east");

        manager.handle_paired("svc".to_string(), "ns".to_string(), gw.clone());
        assert_eq!(manager.workers.len(), 1);

        manager
            .handle_unpaired(
                "svc".to_string(),
                "ns".to_string(),
                gw.name.clone(),
                gw.namespace.clone(),
                gw.cluster_name.clone(),
            )
            .await;
        assert!(manager.workers.is_empty());
    }

    #[tokio::test]
    async fn shared_gateway_survives_partial_unpair() {
        let metrics = ProbeMetrics::default();
        let mut manager = ProbeManager::new(metrics, Duration::from_secs(1));
        let gw = gateway("east");

        manager.handle_paired("a".to_string(), "ns".to_string(), gw.clone());
        manager.handle_paired("b".to_string(), "ns".to_string(), gw.clone());
        assert_eq!(manager.workers.len(), 1);

        manager
            .handle_unpaired(
                "a".to_string(),
                "ns".to_string(),
                gw.name.clone(),
                gw.namespace.clone(),
                gw.cluster_name.clone(),
            )
            .await;
        assert_eq!(manager.workers.len(), 1);
    }

    #[tokio::test]
    async fn cluster_not_registered_sweeps_its_workers() {
        let metrics = ProbeMetrics::default();
        let mut manager = ProbeManager::new(metrics, Duration::from_secs(1));

        manager.handle_paired("a".to_string(), "ns".to_string(), gateway("east"));
        manager.handle_paired("b".to_string(), "ns".to_string(), gateway("west"));
        assert_eq!(manager.workers.len(), 2);

        manager.handle_cluster_not_registered("east").await;
        assert_eq!(manager.workers.len(), 1);
        assert!(manager.workers.values().all(|e| e.cluster_name == "west"));
    }
}
