use crate::gateway::GatewaySpec;

/// The closed set of domain events a Cluster Watcher's work queue carries.
/// Informer callbacks (`OnAdd`/`OnUpdate`/`OnDelete`) are not members of
/// this set: they are classified into one of these before ever touching
/// the queue, so the reconciler only ever sees intent, never raw watch
/// deltas.
///
/// `PartialEq`/`Eq`/`Hash` double as the work queue's de-dup key: two equal
/// events in flight coalesce into one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClusterEvent {
    RemoteServiceCreated { name: String, namespace: String },
    RemoteServiceUpdated { name: String, namespace: String },
    RemoteServiceDeleted { name: String, namespace: String },
    RemoteGatewayUpdated { name: String, namespace: String },
    RemoteGatewayDeleted { name: String, namespace: String },
    ClusterUnregistered,
    OrphanedServicesGcTriggered,
    RepairEndpoints,
}

impl ClusterEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterEvent::RemoteServiceCreated { .. } => "remote_service_created",
            ClusterEvent::RemoteServiceUpdated { .. } => "remote_service_updated",
            ClusterEvent::RemoteServiceDeleted { .. } => "remote_service_deleted",
            ClusterEvent::RemoteGatewayUpdated { .. } => "remote_gateway_updated",
            ClusterEvent::RemoteGatewayDeleted { .. } => "remote_gateway_deleted",
            ClusterEvent::ClusterUnregistered => "cluster_unregistered",
            ClusterEvent::OrphanedServicesGcTriggered => "orphaned_services_gc_triggered",
            ClusterEvent::RepairEndpoints => "repair_endpoints",
        }
    }
}

/// Events delivered to the Probe Manager's buffered channel.
#[derive(Clone, Debug)]
pub enum ProbeEvent {
    MirroredServicePaired {
        service_name: String,
        service_namespace: String,
        gateway: GatewaySpec,
    },
    MirroredServiceUnpaired {
        service_name: String,
        service_namespace: String,
        gateway_name: String,
        gateway_namespace: String,
        cluster_name: String,
    },
    GatewayUpdated {
        gateway: GatewaySpec,
    },
    ClusterNotRegistered {
        cluster_name: String,
    },
}

impl ProbeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeEvent::MirroredServicePaired { .. } => "paired",
            ProbeEvent::MirroredServiceUnpaired { .. } => "unpaired",
            ProbeEvent::GatewayUpdated { .. } => "gateway_updated",
            ProbeEvent::ClusterNotRegistered { .. } => "cluster_not_registered",
        }
    }
}
