//! One reconciliation loop per registered remote cluster.
//!
//! Three tasks run per Cluster Watcher: an informer dispatch task
//! that classifies raw remote watch events into [`ClusterEvent`]s and
//! enqueues them (never performing I/O itself), a single reconciliation
//! task that drains the queue serially (the only writer of this cluster's
//! mirror set), and a periodic ticker that enqueues `RepairEndpoints`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::Api,
    runtime::{reflector, watcher, WatchStreamExt},
    Client, ResourceExt,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use service_mirror_core::{labels, ClusterEvent, GatewaySpec, Link, ProbeEvent, ReconcileError};
use service_mirror_k8s_api::LocalApi;

use crate::gateway;
use crate::metrics::{ClusterLabels, EventLabels, IndexMetrics};
use crate::mirror;
use crate::queue::Queue;

/// Everything needed to start a Cluster Watcher for one registered Link.
pub struct ClusterWatcherConfig {
    pub cluster_name: String,
    pub link: Link,
    pub link_resource_version: String,
    pub remote_client: Client,
    pub local: Arc<LocalApi>,
    pub probe_tx: mpsc::Sender<ProbeEvent>,
    pub requeue_limit: u32,
    pub repair_period: Duration,
    pub gc_period: Duration,
    pub metrics: IndexMetrics,
}

/// A handle to a running Cluster Watcher, returned by [`start`].
pub struct ClusterWatcherHandle {
    cluster_name: String,
    link_resource_version: String,
    local: Arc<LocalApi>,
    probe_tx: mpsc::Sender<ProbeEvent>,
    metrics: IndexMetrics,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ClusterWatcherHandle {
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// The `resource_version` of the `Link` this watcher was started from.
    /// Compared against incoming Apply events to detect credential/selector/
    /// gateway rotation that needs a stop-and-re-register cycle.
    pub fn link_resource_version(&self) -> &str {
        &self.link_resource_version
    }

    /// Closes the informer stop channel and drains the background tasks;
    /// if `cleanup_state`, deletes every mirror tagged with this cluster.
    #[instrument(skip(self), fields(cluster = %self.cluster_name, cleanup_state))]
    pub async fn stop(self, cleanup_state: bool) {
        let _ = self.stop_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        if cleanup_state {
            delete_all_mirrors(&self.local, &self.cluster_name, &self.probe_tx, &self.metrics).await;
        }
        info!("cluster watcher stopped");
    }
}

/// Starts a Cluster Watcher: syncs the remote informer, enqueues the
/// start-up GC event, and attaches the remote Service handlers.
pub async fn start(config: ClusterWatcherConfig) -> ClusterWatcherHandle {
    let ClusterWatcherConfig {
        cluster_name,
        link,
        link_resource_version,
        remote_client,
        local,
        probe_tx,
        requeue_limit,
        repair_period,
        gc_period,
        metrics,
    } = config;

    let (stop_tx, stop_rx) = watch::channel(false);
    let queue: Queue<ClusterEvent> = Queue::new();

    let dispatch_task = spawn_dispatch(
        remote_client.clone(),
        link.clone(),
        cluster_name.clone(),
        local.clone(),
        queue.clone(),
        stop_rx.clone(),
    );

    let reconciler = Arc::new(Reconciler {
        cluster_name: cluster_name.clone(),
        link,
        remote: dispatch_task.remote_reader,
        local,
        probe_tx: probe_tx.clone(),
        queue: queue.clone(),
        requeue_limit,
        metrics,
    });
    let reconciler_task = spawn_reconciler(reconciler.clone(), stop_rx.clone());
    let repair_task = spawn_periodic(queue.clone(), repair_period, ClusterEvent::RepairEndpoints, stop_rx.clone());
    let gc_task = spawn_periodic(queue, gc_period, ClusterEvent::OrphanedServicesGcTriggered, stop_rx);

    ClusterWatcherHandle {
        cluster_name: reconciler.cluster_name.clone(),
        link_resource_version,
        local: reconciler.local.clone(),
        probe_tx,
        metrics: reconciler.metrics.clone(),
        stop_tx,
        tasks: vec![dispatch_task.handle, reconciler_task, repair_task, gc_task],
    }
}

struct DispatchTask {
    handle: JoinHandle<()>,
    remote_reader: reflector::Store<Service>,
}

fn spawn_dispatch(
    remote_client: Client,
    link: Link,
    cluster_name: String,
    local: Arc<LocalApi>,
    queue: Queue<ClusterEvent>,
    mut stop_rx: watch::Receiver<bool>,
) -> DispatchTask {
    let (reader, writer) = reflector::store();
    let remote_reader = reader.clone();
    let handle = tokio::spawn(
        async move {
            let mut stream = watcher(Api::<Service>::all(remote_client), watcher::Config::default())
                .default_backoff()
                .reflect(writer)
                .boxed();
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    next = stream.next() => match next {
                        Some(Ok(watcher::Event::InitDone)) => {
                            queue.add(ClusterEvent::OrphanedServicesGcTriggered);
                        }
                        Some(Ok(watcher::Event::Apply(svc))) | Some(Ok(watcher::Event::InitApply(svc))) => {
                            let mirror_name = labels::mirror_name(&svc.name_any(), &cluster_name);
                            let namespace = svc.namespace().unwrap_or_default();
                            let local_mirror = local.get_service(&namespace, &mirror_name);
                            if let Some(event) = classify_upsert(&svc, &link, local_mirror.as_deref()) {
                                queue.add(event);
                            }
                        }
                        Some(Ok(watcher::Event::Delete(svc))) => {
                            let mirror_name = labels::mirror_name(&svc.name_any(), &cluster_name);
                            let namespace = svc.namespace().unwrap_or_default();
                            let local_mirror = local.get_service(&namespace, &mirror_name);
                            if let Some(event) = classify_delete(&svc, &link, local_mirror.as_deref()) {
                                queue.add(event);
                            }
                        }
                        Some(Ok(watcher::Event::Init)) => {}
                        Some(Err(error)) => warn!(%error, "remote informer error, resync pending"),
                        None => break,
                    },
                }
            }
        }
        .instrument(info_span!("remote_informer")),
    );
    DispatchTask { handle, remote_reader }
}

fn spawn_reconciler(reconciler: Arc<Reconciler>, mut stop_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    event = reconciler.queue.get() => {
                        reconciler.handle_one(event).await;
                    }
                }
            }
        }
        .instrument(info_span!("reconciler")),
    )
}

/// Enqueues `event` on a fixed period, skipping the immediate first tick
/// since both `RepairEndpoints` and `OrphanedServicesGcTriggered` already
/// have a start-up equivalent (the reconciler's first pass and the
/// informer's `InitDone`, respectively).
fn spawn_periodic(
    queue: Queue<ClusterEvent>,
    period: Duration,
    event: ClusterEvent,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => queue.add(event.clone()),
            }
        }
    })
}

/// Classification for `Apply`/`InitApply` events into reconciler intent.
/// `local_mirror` is the currently cached mirror Service for this remote
/// service, if any; kept as a plain parameter so this stays a pure function
/// over its inputs.
fn classify_upsert(
    remote_svc: &Service,
    link: &Link,
    local_mirror: Option<&Service>,
) -> Option<ClusterEvent> {
    let name = remote_svc.name_any();
    let namespace = remote_svc.namespace().unwrap_or_default();

    if name == link.gateway_name && namespace == link.gateway_namespace {
        return Some(ClusterEvent::RemoteGatewayUpdated { name, namespace });
    }

    let exported = remote_svc
        .metadata
        .labels
        .as_ref()
        .map(|l| link.matches(l))
        .unwrap_or(false);

    match (local_mirror, exported) {
        (None, true) => Some(ClusterEvent::RemoteServiceCreated { name, namespace }),
        (None, false) => None,
        (Some(local_svc), true) => {
            let remote_rv = remote_svc.resource_version().unwrap_or_default();
            let local_rv = local_svc
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(labels::ANNOTATION_REMOTE_RESOURCE_VERSION))
                .cloned()
                .unwrap_or_default();
            if remote_rv != local_rv {
                Some(ClusterEvent::RemoteServiceUpdated { name, namespace })
            } else {
                None
            }
        }
        (Some(_), false) => Some(ClusterEvent::RemoteServiceDeleted { name, namespace }),
    }
}

/// Classification for `Delete` events.
fn classify_delete(
    remote_svc: &Service,
    link: &Link,
    local_mirror: Option<&Service>,
) -> Option<ClusterEvent> {
    let name = remote_svc.name_any();
    let namespace = remote_svc.namespace().unwrap_or_default();

    if name == link.gateway_name && namespace == link.gateway_namespace {
        return Some(ClusterEvent::RemoteGatewayDeleted { name, namespace });
    }

    if local_mirror.is_some() {
        Some(ClusterEvent::RemoteServiceDeleted { name, namespace })
    } else {
        None
    }
}

/// The reconciliation state machine: the only writer of this cluster's
/// mirror set.
struct Reconciler {
    cluster_name: String,
    link: Link,
    remote: reflector::Store<Service>,
    local: Arc<LocalApi>,
    probe_tx: mpsc::Sender<ProbeEvent>,
    queue: Queue<ClusterEvent>,
    requeue_limit: u32,
    metrics: IndexMetrics,
}

impl Reconciler {
    #[instrument(skip(self), fields(cluster = %self.cluster_name, event = event.kind()))]
    async fn handle_one(&self, event: ClusterEvent) {
        let result = self.dispatch(&event).await;
        match result {
            Ok(()) => {
                self.queue.forget(&event);
                self.metrics
                    .events_handled
                    .get_or_create(&EventLabels {
                        remote_cluster_name: self.cluster_name.clone(),
                        event_type: event.kind().to_string(),
                    })
                    .inc();
            }
            Err(error) => {
                let attempts = self.queue.attempts(&event);
                if attempts < self.requeue_limit {
                    warn!(%error, attempts, "reconcile failed, requeueing");
                    self.queue.add_rate_limited(event.clone());
                } else {
                    error!(%error, attempts, "reconcile failed, giving up after requeue limit");
                    self.queue.forget(&event);
                    self.metrics
                        .events_dropped
                        .get_or_create(&EventLabels {
                            remote_cluster_name: self.cluster_name.clone(),
                            event_type: event.kind().to_string(),
                        })
                        .inc();
                }
            }
        }
        self.queue.done(&event);
        self.record_mirror_count();
    }

    async fn dispatch(&self, event: &ClusterEvent) -> Result<(), ReconcileError> {
        match event {
            ClusterEvent::RemoteServiceCreated { name, namespace }
            | ClusterEvent::RemoteServiceUpdated { name, namespace } => {
                self.reconcile_service(name, namespace).await
            }
            ClusterEvent::RemoteServiceDeleted { name, namespace } => {
                self.delete_mirror(name, namespace).await
            }
            ClusterEvent::RemoteGatewayUpdated { .. }
            | ClusterEvent::RemoteGatewayDeleted { .. }
            | ClusterEvent::RepairEndpoints => self.resync_all_mirrors().await,
            ClusterEvent::ClusterUnregistered => {
                delete_all_mirrors(&self.local, &self.cluster_name, &self.probe_tx, &self.metrics).await;
                Ok(())
            }
            ClusterEvent::OrphanedServicesGcTriggered => self.gc().await,
        }
    }

    fn current_gateway(&self) -> Option<GatewaySpec> {
        let key = reflector::ObjectRef::new(&self.link.gateway_name).within(&self.link.gateway_namespace);
        let gw = self.remote.get(&key)?;
        gateway::resolve(&gw, &self.link)
    }

    /// Creates or updates the mirror for one remote service, handling
    /// both `RemoteServiceCreated` and `RemoteServiceUpdated`.
    async fn reconcile_service(&self, remote_name: &str, namespace: &str) -> Result<(), ReconcileError> {
        let key = reflector::ObjectRef::new(remote_name).within(namespace);
        let remote_svc = match self.remote.get(&key) {
            Some(svc) => svc,
            None => {
                debug!(remote_name, namespace, "remote service vanished before reconcile, absorbing");
                return Ok(());
            }
        };

        let exported = remote_svc
            .metadata
            .labels
            .as_ref()
            .map(|l| self.link.matches(l))
            .unwrap_or(false);
        if !exported {
            return self.delete_mirror(remote_name, namespace).await;
        }

        self.local
            .ensure_mirrored_namespace(namespace)
            .await
            .map_err(ReconcileError::Api)?;

        let remote_rv = remote_svc.resource_version().unwrap_or_default();
        let remote_ports = remote_svc
            .spec
            .as_ref()
            .and_then(|s| s.ports.clone())
            .unwrap_or_default();
        let gateway = self.current_gateway();

        let mirror_svc = mirror::build_mirror_service(
            remote_name,
            namespace,
            &remote_rv,
            &remote_ports,
            &self.cluster_name,
            &self.link.cluster_domain,
            &self.link.gateway_name,
            &self.link.gateway_namespace,
            gateway.as_ref(),
        );
        let mirror_name = mirror_svc.metadata.name.clone().unwrap_or_default();
        let mirror_ports = mirror_svc
            .spec
            .as_ref()
            .and_then(|s| s.ports.clone())
            .unwrap_or_default();
        self.local
            .apply_service(namespace, mirror_svc)
            .await
            .map_err(ReconcileError::Api)?;

        let endpoints = mirror::build_mirror_endpoints(
            &mirror_name,
            namespace,
            &mirror_ports,
            &self.cluster_name,
            &self.link.gateway_name,
            &self.link.gateway_namespace,
            gateway.as_ref(),
        );
        self.local
            .apply_endpoints(namespace, endpoints)
            .await
            .map_err(ReconcileError::Api)?;

        if let Some(gateway) = gateway {
            let event = ProbeEvent::MirroredServicePaired {
                service_name: mirror_name,
                service_namespace: namespace.to_string(),
                gateway,
            };
            self.metrics.record_probe_enqueue(&event);
            let _ = self.probe_tx.send(event).await;
        }

        Ok(())
    }

    /// Deletes a mirror and unpairs it from its Probe Worker. Handles
    /// `RemoteServiceDeleted`.
    async fn delete_mirror(&self, remote_name: &str, namespace: &str) -> Result<(), ReconcileError> {
        let mirror_name = labels::mirror_name(remote_name, &self.cluster_name);
        delete_service_and_endpoints(&self.local, namespace, &mirror_name).await?;
        gc_namespace_if_empty(&self.local, namespace).await;

        let event = ProbeEvent::MirroredServiceUnpaired {
            service_name: mirror_name,
            service_namespace: namespace.to_string(),
            gateway_name: self.link.gateway_name.clone(),
            gateway_namespace: self.link.gateway_namespace.clone(),
            cluster_name: self.cluster_name.clone(),
        };
        self.metrics.record_probe_enqueue(&event);
        let _ = self.probe_tx.send(event).await;
        Ok(())
    }

    /// Re-derives every mirror's endpoints (and, incidentally, its
    /// service annotations) from the current gateway resolution.
    /// Handles `RemoteGatewayUpdated`, `RemoteGatewayDeleted` (gateway
    /// resolves to `None` once the remote cache reflects the delete) and
    /// the periodic `RepairEndpoints` tick alike.
    async fn resync_all_mirrors(&self) -> Result<(), ReconcileError> {
        let selector = cluster_selector(&self.cluster_name);
        let suffix = format!("-{}", self.cluster_name);
        let mut last_err = None;
        for mirror_svc in self.local.list_services(&selector) {
            let Some(mirror_name) = mirror_svc.metadata.name.as_deref() else { continue };
            let Some(remote_name) = mirror_name.strip_suffix(&suffix) else { continue };
            let namespace = mirror_svc.metadata.namespace.clone().unwrap_or_default();
            if let Err(error) = self.reconcile_service(remote_name, &namespace).await {
                warn!(%error, remote_name, namespace, "failed to resync one mirror");
                last_err = Some(error);
            }
        }

        let gateway = self.current_gateway().unwrap_or_else(|| GatewaySpec {
            name: self.link.gateway_name.clone(),
            namespace: self.link.gateway_namespace.clone(),
            cluster_name: self.cluster_name.clone(),
            addresses: Vec::new(),
            incoming_port: 0,
            resource_version: String::new(),
            identity: self.link.gateway_identity.clone(),
            probe_spec: self.link.probe_spec.clone(),
        });
        let event = ProbeEvent::GatewayUpdated { gateway };
        self.metrics.record_probe_enqueue(&event);
        let _ = self.probe_tx.send(event).await;

        match last_err {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Handles `OrphanedServicesGcTriggered`: deletes every local mirror
    /// tagged with this cluster whose remote counterpart is gone or no
    /// longer exported, then deletes any mirrored namespace
    /// (`LABEL_MIRRORED_NAMESPACE`) that GC just emptied.
    async fn gc(&self) -> Result<(), ReconcileError> {
        let selector = cluster_selector(&self.cluster_name);
        let suffix = format!("-{}", self.cluster_name);
        for mirror_svc in self.local.list_services(&selector) {
            let Some(mirror_name) = mirror_svc.metadata.name.as_deref() else { continue };
            let Some(remote_name) = mirror_name.strip_suffix(&suffix) else { continue };
            let namespace = mirror_svc.metadata.namespace.clone().unwrap_or_default();

            let key = reflector::ObjectRef::new(remote_name).within(&namespace);
            let still_valid = self.remote.get(&key).is_some_and(|svc| {
                svc.metadata
                    .labels
                    .as_ref()
                    .map(|l| self.link.matches(l))
                    .unwrap_or(false)
            });
            if !still_valid {
                self.delete_mirror(remote_name, &namespace).await?;
            }
        }
        Ok(())
    }

    fn record_mirror_count(&self) {
        let selector = cluster_selector(&self.cluster_name);
        let count = self.local.list_services(&selector).len();
        self.metrics
            .num_mirrored_services
            .get_or_create(&ClusterLabels {
                remote_cluster_name: self.cluster_name.clone(),
            })
            .set(count as i64);
    }
}

async fn delete_service_and_endpoints(
    local: &LocalApi,
    namespace: &str,
    mirror_name: &str,
) -> Result<(), ReconcileError> {
    if let Err(error) = local.delete_service(namespace, mirror_name).await {
        if !error.is_absorbable_on_delete() {
            return Err(ReconcileError::Api(error));
        }
    }
    if let Err(error) = local.delete_endpoints(namespace, mirror_name).await {
        if !error.is_absorbable_on_delete() {
            return Err(ReconcileError::Api(error));
        }
    }
    Ok(())
}

/// Handles `ClusterUnregistered` and `Stop(cleanup_state=true)`: deletes
/// every mirror tagged with `cluster_name` and tells the Probe Manager
/// the cluster is gone.
async fn delete_all_mirrors(
    local: &Arc<LocalApi>,
    cluster_name: &str,
    probe_tx: &mpsc::Sender<ProbeEvent>,
    metrics: &IndexMetrics,
) {
    let selector = cluster_selector(cluster_name);
    let mut touched_namespaces = std::collections::BTreeSet::new();
    for mirror_svc in local.list_services(&selector) {
        let (Some(name), Some(namespace)) = (
            mirror_svc.metadata.name.clone(),
            mirror_svc.metadata.namespace.clone(),
        ) else {
            continue;
        };
        if let Err(error) = delete_service_and_endpoints(local, &namespace, &name).await {
            warn!(%error, name, namespace, "failed to delete mirror during cluster teardown");
        }
        touched_namespaces.insert(namespace);
    }
    for namespace in touched_namespaces {
        gc_namespace_if_empty(local, &namespace).await;
    }
    let event = ProbeEvent::ClusterNotRegistered {
        cluster_name: cluster_name.to_string(),
    };
    metrics.record_probe_enqueue(&event);
    let _ = probe_tx.send(event).await;
}

/// Deletes `namespace` if it was created to host mirrors
/// (`LABEL_MIRRORED_NAMESPACE`) and no mirror Service remains in it, from
/// any registered cluster. Absorbs delete errors as a best-effort sweep —
/// a failed namespace GC is retried on the next `OrphanedServicesGcTriggered`
/// tick or cluster teardown, never surfaced as a reconcile failure.
async fn gc_namespace_if_empty(local: &LocalApi, namespace: &str) {
    let all_mirrors = [(labels::LABEL_MIRRORED_RESOURCE.to_string(), "true".to_string())]
        .into_iter()
        .collect();
    let still_has_mirrors = local
        .list_services(&all_mirrors)
        .iter()
        .any(|svc| svc.metadata.namespace.as_deref() == Some(namespace));
    if still_has_mirrors {
        return;
    }

    let is_mirrored_namespace = local.get_namespace(namespace).is_some_and(|ns| {
        ns.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(labels::LABEL_MIRRORED_NAMESPACE))
            .map(String::as_str)
            == Some("true")
    });
    if !is_mirrored_namespace {
        return;
    }

    if let Err(error) = local.delete_namespace(namespace).await {
        warn!(%error, namespace, "failed to delete empty mirrored namespace");
    }
}

fn cluster_selector(cluster_name: &str) -> BTreeMap<String, String> {
    [
        (labels::LABEL_MIRRORED_RESOURCE.to_string(), "true".to_string()),
        (labels::LABEL_REMOTE_CLUSTER_NAME.to_string(), cluster_name.to_string()),
    ]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ServiceSpec;
    use kube::api::ObjectMeta;
    use maplit::btreemap;

    fn link() -> Link {
        Link {
            cluster_name: "remote".to_string(),
            cluster_domain: "cluster.local".to_string(),
            gateway_name: "linkerd-gateway".to_string(),
            gateway_namespace: "linkerd-multicluster".to_string(),
            gateway_address: "gw.remote.svc".to_string(),
            gateway_port: 4143,
            gateway_identity: None,
            probe_spec: Default::default(),
            selector: btreemap! { "mirror.linkerd.io/exported".to_string() => "true".to_string() },
        }
    }

    fn remote_service(name: &str, namespace: &str, rv: &str, exported: bool) -> Service {
        let labels = if exported {
            btreemap! { "mirror.linkerd.io/exported".to_string() => "true".to_string() }
        } else {
            btreemap! {}
        };
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some(rv.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(ServiceSpec::default()),
            status: None,
        }
    }

    fn mirror_service(remote_rv: &str) -> Service {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            labels::ANNOTATION_REMOTE_RESOURCE_VERSION.to_string(),
            remote_rv.to_string(),
        );
        Service {
            metadata: ObjectMeta {
                name: Some("svc-one-remote".to_string()),
                namespace: Some("ns1".to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(ServiceSpec::default()),
            status: None,
        }
    }

    #[test]
    fn classify_gateway_name_match_is_gateway_event() {
        let svc = remote_service("linkerd-gateway", "linkerd-multicluster", "1", false);
        let event = classify_upsert(&svc, &link(), None);
        assert_eq!(
            event,
            Some(ClusterEvent::RemoteGatewayUpdated {
                name: "linkerd-gateway".to_string(),
                namespace: "linkerd-multicluster".to_string(),
            })
        );
    }

    #[test]
    fn classify_new_exported_service_is_created() {
        let svc = remote_service("svc-one", "ns1", "111", true);
        let event = classify_upsert(&svc, &link(), None);
        assert_eq!(
            event,
            Some(ClusterEvent::RemoteServiceCreated {
                name: "svc-one".to_string(),
                namespace: "ns1".to_string(),
            })
        );
    }

    #[test]
    fn classify_unexported_without_mirror_is_none() {
        let svc = remote_service("svc-one", "ns1", "111", false);
        assert_eq!(classify_upsert(&svc, &link(), None), None);
    }

    #[test]
    fn classify_unchanged_resource_version_is_none() {
        let svc = remote_service("svc-one", "ns1", "111", true);
        let mirror = mirror_service("111");
        assert_eq!(classify_upsert(&svc, &link(), Some(&mirror)), None);
    }

    #[test]
    fn classify_changed_resource_version_is_updated() {
        let svc = remote_service("svc-one", "ns1", "222", true);
        let mirror = mirror_service("111");
        assert_eq!(
            classify_upsert(&svc, &link(), Some(&mirror)),
            Some(ClusterEvent::RemoteServiceUpdated {
                name: "svc-one".to_string(),
                namespace: "ns1".to_string(),
            })
        );
    }

    #[test]
    fn classify_no_longer_exported_with_mirror_is_deleted() {
        let svc = remote_service("svc-one", "ns1", "111", false);
        let mirror = mirror_service("111");
        assert_eq!(
            classify_upsert(&svc, &link(), Some(&mirror)),
            Some(ClusterEvent::RemoteServiceDeleted {
                name: "svc-one".to_string(),
                namespace: "ns1".to_string(),
            })
        );
    }

    #[test]
    fn classify_delete_without_mirror_is_none() {
        let svc = remote_service("svc-one", "ns1", "111", true);
        assert_eq!(classify_delete(&svc, &link(), None), None);
    }

    #[test]
    fn classify_delete_with_mirror_is_deleted() {
        let svc = remote_service("svc-one", "ns1", "111", true);
        let mirror = mirror_service("111");
        assert_eq!(
            classify_delete(&svc, &link(), Some(&mirror)),
            Some(ClusterEvent::RemoteServiceDeleted {
                name: "svc-one".to_string(),
                namespace: "ns1".to_string(),
            })
        );
    }

    #[test]
    fn cluster_selector_includes_both_labels() {
        let sel = cluster_selector("remote");
        assert_eq!(sel.get(labels::LABEL_REMOTE_CLUSTER_NAME), Some(&"remote".to_string()));
        assert_eq!(sel.get(labels::LABEL_MIRRORED_RESOURCE), Some(&"true".to_string()));
    }
}
