//! Label and annotation keys used to mark and locate mirrored resources.
//!
//! These are the only channel through which the Cluster Watcher recognizes
//! resources it owns: ownership is inferred from labels, never from a
//! separate bookkeeping store, so a restarted controller can always find its
//! own mirrors again (see `OrphanedServicesGcTriggered`).

/// Marks a Service/Endpoints pair as a mirror of a remote service.
pub const LABEL_MIRRORED_RESOURCE: &str = "mirror.linkerd.io/mirrored-resource";
/// The name of the remote cluster a mirror was created for.
pub const LABEL_REMOTE_CLUSTER_NAME: &str = "mirror.linkerd.io/cluster-name";
/// The name of the remote gateway Service a mirror's endpoints resolve to.
pub const LABEL_REMOTE_GATEWAY_NAME: &str = "mirror.linkerd.io/remote-gateway-name";
/// The namespace of the remote gateway Service a mirror's endpoints resolve to.
pub const LABEL_REMOTE_GATEWAY_NS: &str = "mirror.linkerd.io/remote-gateway-ns";
/// Marks a Namespace as created to host mirrors, so GC can remove it.
pub const LABEL_MIRRORED_NAMESPACE: &str = "mirror.linkerd.io/mirrored-namespace";

/// The remote service's resource version at the last successful reconcile.
pub const ANNOTATION_REMOTE_RESOURCE_VERSION: &str = "mirror.linkerd.io/remote-resource-version";
/// The remote service's fully-qualified DNS name in its own cluster.
pub const ANNOTATION_REMOTE_SERVICE_FQ_NAME: &str = "mirror.linkerd.io/remote-service-fq-name";
/// The remote gateway's resource version, set only once gateway resolution succeeds.
pub const ANNOTATION_REMOTE_GATEWAY_RESOURCE_VERSION: &str =
    "mirror.linkerd.io/remote-gateway-resource-version";

/// The name of the Service port that identifies a gateway's incoming
/// data-plane port.
pub const GATEWAY_PORT_NAME: &str = "mc-gateway";

/// Computes the mirror name for a remote service: `<remote-name>-<cluster-name>`.
pub fn mirror_name(remote_name: &str, cluster_name: &str) -> String {
    format!("{remote_name}-{cluster_name}")
}

/// Computes the remote service's fully-qualified DNS name in its own cluster.
pub fn remote_fq_name(remote_name: &str, remote_namespace: &str, remote_domain: &str) -> String {
    format!("{remote_name}.{remote_namespace}.svc.{remote_domain}")
}

/// True if `labels` carries the mirror-ownership label set for `cluster_name`.
pub fn is_mirror_for_cluster(labels: &std::collections::BTreeMap<String, String>, cluster_name: &str) -> bool {
    labels.get(LABEL_MIRRORED_RESOURCE).map(String::as_str) == Some("true")
        && labels.get(LABEL_REMOTE_CLUSTER_NAME).map(String::as_str) == Some(cluster_name)
}
