//! One task per gateway, polling a random address from its ingress list
//! on its configured period and recording liveness.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use service_mirror_core::GatewaySpec;

use crate::metrics::{GatewayLabels, ProbeMetrics, ProbeOutcomeLabels};

/// Ticks jitter by up to 10% of the configured period in either direction,
/// so that many workers sharing a period don't all probe in lockstep.
const JITTER_FRACTION: f64 = 0.10;

pub fn spawn(
    client: reqwest::Client,
    mut gateway_rx: watch::Receiver<GatewaySpec>,
    mut stop_rx: watch::Receiver<bool>,
    metrics: ProbeMetrics,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let gateway = gateway_rx.borrow().clone();
            let sleep = jittered(gateway.probe_spec.period);
            tokio::select! {
                _ = stop_rx.changed() => break,
                changed = gateway_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep(sleep) => {}
            }
            let gateway = gateway_rx.borrow().clone();
            tick(&client, &gateway, &metrics).await;
        }
        debug!("probe worker stopped");
    })
}

fn jittered(period: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    period.mul_f64((1.0 + jitter).max(0.0))
}

#[instrument(skip(client, metrics), fields(gateway = %gateway.name, cluster = %gateway.cluster_name))]
async fn tick(client: &reqwest::Client, gateway: &GatewaySpec, metrics: &ProbeMetrics) {
    let labels = GatewayLabels {
        remote_cluster_name: gateway.cluster_name.clone(),
        gateway_namespace: gateway.namespace.clone(),
        gateway_name: gateway.name.clone(),
    };

    if gateway.addresses.is_empty() {
        metrics.gateway_alive.get_or_create(&labels).set(0);
        return;
    }

    let address = &gateway.addresses[rand::thread_rng().gen_range(0..gateway.addresses.len())];
    let url = format!(
        "http://{address}:{port}{path}",
        port = gateway.probe_spec.port,
        path = gateway.probe_spec.path
    );

    let outcome_labels = |probe_successful: bool| ProbeOutcomeLabels {
        remote_cluster_name: labels.remote_cluster_name.clone(),
        gateway_namespace: labels.gateway_namespace.clone(),
        gateway_name: labels.gateway_name.clone(),
        probe_successful,
    };

    let start = Instant::now();
    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            metrics.gateway_alive.get_or_create(&labels).set(1);
            metrics.probes_total.get_or_create(&outcome_labels(true)).inc();
            metrics
                .request_latency_ms
                .get_or_create(&labels)
                .observe(start.elapsed().as_secs_f64() * 1000.0);
        }
        Ok(response) => {
            warn!(status = %response.status(), %url, "gateway probe returned non-success status");
            metrics.gateway_alive.get_or_create(&labels).set(0);
            metrics.probes_total.get_or_create(&outcome_labels(false)).inc();
        }
        Err(error) => {
            warn!(%error, %url, "gateway probe failed");
            metrics.gateway_alive.get_or_create(&labels).set(0);
            metrics.probes_total.get_or_create(&outcome_labels(false)).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let period = Duration::from_secs(10);
        for _ in 0..100 {
            let d = jittered(period);
            assert!(d >= Duration::from_secs_f64(9.0));
            assert!(d <= Duration::from_secs_f64(11.0));
        }
    }
}
