use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::sync::mpsc;
use tracing::{info_span, Instrument};

use service_mirror_core::ProbeEvent;
use service_mirror_k8s_api::LocalApi;
use service_mirror_k8s_index::{ConfigWatcher, ConfigWatcherConfig, IndexMetrics};
use service_mirror_probe::{ProbeManager, ProbeMetrics};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[clap(name = "service-mirror", about = "Mirrors exported services from linked remote clusters")]
pub struct Args {
    #[clap(long, default_value = "linkerd=info,warn", env = "SERVICE_MIRROR_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Work queue events are retried this many times before being dropped.
    #[clap(long, default_value = "3")]
    event_requeue_limit: u32,

    /// How often every mirrored service's endpoints are recomputed from
    /// the remote gateway, independent of any informer event.
    #[clap(long, default_value = "30")]
    repair_period_seconds: u64,

    /// How often orphaned mirrors (whose remote counterpart is gone or no
    /// longer exported) are swept, independent of the start-up GC pass.
    #[clap(long, default_value = "60")]
    gc_period_seconds: u64,

    /// Buffer size of the channel carrying pairing events to the probe
    /// manager. A full channel applies backpressure to Cluster Watcher
    /// reconciliation, so this should comfortably exceed the number of
    /// mirrored services expected across every linked cluster.
    #[clap(long, default_value = "500")]
    probe_channel_capacity: usize,

    /// Timeout applied to each individual gateway liveness probe request.
    #[clap(long, default_value = "10")]
    probe_timeout_seconds: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            event_requeue_limit,
            repair_period_seconds,
            gc_period_seconds,
            probe_channel_capacity,
            probe_timeout_seconds,
        } = self;

        let mut prom = Registry::default();
        let index_metrics = IndexMetrics::register(prom.sub_registry_with_prefix("cluster_watcher"));
        let probe_metrics = ProbeMetrics::register(prom.sub_registry_with_prefix("probe"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let local = Arc::new(LocalApi::new(runtime.client()));
        if !local.sync(runtime.shutdown_handle()).await {
            anyhow::bail!("local API caches never became ready before shutdown");
        }

        let (probe_tx, probe_rx) = mpsc::channel::<ProbeEvent>(probe_channel_capacity);

        let probe_manager = ProbeManager::new(probe_metrics, Duration::from_secs(probe_timeout_seconds.max(1)));
        tokio::spawn(probe_manager.run(probe_rx).instrument(info_span!("probe_manager")));

        let config_watcher = ConfigWatcher::new(ConfigWatcherConfig {
            local,
            probe_tx,
            requeue_limit: event_requeue_limit,
            repair_period: Duration::from_secs(repair_period_seconds.max(1)).max(DEFAULT_PROBE_TIMEOUT),
            gc_period: Duration::from_secs(gc_period_seconds.max(1)),
            metrics: index_metrics,
        });
        tokio::spawn(config_watcher.run(runtime.shutdown_handle()).instrument(info_span!("config_watcher")));

        if runtime.run().await.is_err() {
            anyhow::bail!("aborted");
        }
        Ok(())
    }
}
