//! Gateway liveness gauges and the probe manager's event counter.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct GatewayLabels {
    pub remote_cluster_name: String,
    pub gateway_namespace: String,
    pub gateway_name: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeOutcomeLabels {
    pub remote_cluster_name: String,
    pub gateway_namespace: String,
    pub gateway_name: String,
    pub probe_successful: bool,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ManagerEventLabels {
    pub event_type: String,
}

#[derive(Clone, Debug)]
pub struct ProbeMetrics {
    pub gateway_alive: Family<GatewayLabels, Gauge>,
    pub probes_total: Family<ProbeOutcomeLabels, Counter>,
    pub request_latency_ms: Family<GatewayLabels, Histogram>,
    pub manager_dequeues_total: Family<ManagerEventLabels, Counter>,
}

impl Default for ProbeMetrics {
    fn default() -> Self {
        Self {
            gateway_alive: Family::default(),
            probes_total: Family::default(),
            request_latency_ms: Family::new_with_constructor(|| {
                Histogram::new(exponential_buckets(1.0, 2.0, 17))
            }),
            manager_dequeues_total: Family::default(),
        }
    }
}

impl ProbeMetrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "gateway_alive",
            "Whether the most recent liveness probe against a remote gateway succeeded",
            metrics.gateway_alive.clone(),
        );
        registry.register(
            "gateway_probes",
            "Liveness probes sent to remote gateways, partitioned by outcome",
            metrics.probes_total.clone(),
        );
        registry.register(
            "gateway_request_latency_ms",
            "Round-trip latency of successful gateway liveness probes",
            metrics.request_latency_ms.clone(),
        );
        registry.register(
            "probe_manager_event_dequeues",
            "Events dequeued from the probe manager's channel, by type",
            metrics.manager_dequeues_total.clone(),
        );
        metrics
    }
}
