//! `num_mirrored_services` and Cluster Watcher reconcile counters.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::{counter::Counter, family::Family, gauge::Gauge};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ClusterLabels {
    pub remote_cluster_name: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    pub remote_cluster_name: String,
    pub event_type: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeEventLabels {
    pub event_type: String,
}

#[derive(Clone, Debug, Default)]
pub struct IndexMetrics {
    pub num_mirrored_services: Family<ClusterLabels, Gauge>,
    pub events_handled: Family<EventLabels, Counter>,
    pub events_dropped: Family<EventLabels, Counter>,
    /// Counts probe-pairing events as they are sent to the Probe Manager's
    /// channel; the manager's own `probe_manager_event_dequeues_total`
    /// counts the other end, so a sustained gap between the two is a
    /// backed-up channel.
    pub probe_event_enqueues: Family<ProbeEventLabels, Counter>,
}

impl IndexMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "num_mirrored_services",
            "Number of mirror services currently maintained for a remote cluster",
            metrics.num_mirrored_services.clone(),
        );
        registry.register(
            "cluster_watcher_events_handled",
            "Work queue events successfully reconciled, by type",
            metrics.events_handled.clone(),
        );
        registry.register(
            "cluster_watcher_events_dropped",
            "Work queue events dropped after exhausting the requeue limit",
            metrics.events_dropped.clone(),
        );
        registry.register(
            "probe_manager_event_enqueues",
            "Pairing events sent to the probe manager's channel, by type",
            metrics.probe_event_enqueues.clone(),
        );
        metrics
    }

    pub fn record_probe_enqueue(&self, event: &service_mirror_core::ProbeEvent) {
        self.probe_event_enqueues
            .get_or_create(&ProbeEventLabels {
                event_type: event.kind().to_string(),
            })
            .inc();
    }
}
