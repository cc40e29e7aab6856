use std::collections::BTreeMap;
use std::time::Duration;

/// A probe configuration: how a Probe Worker reaches a gateway's liveness
/// endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeSpec {
    pub path: String,
    pub port: u16,
    pub period: Duration,
}

impl Default for ProbeSpec {
    fn default() -> Self {
        Self {
            path: "/live".to_string(),
            port: 4191,
            period: Duration::from_secs(10),
        }
    }
}

/// Process-wide configuration for one remote cluster.
///
/// Constructed once by the Config Watcher from a parsed Link resource and a
/// kubeconfig Secret, then handed to a new Cluster Watcher. `Link` itself
/// carries no live connection state; the remote `kube::Client` is built
/// separately once the kubeconfig bytes are parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub cluster_name: String,
    pub cluster_domain: String,
    /// The gateway Service's name in the remote cluster; identifies which
    /// remote Service the Cluster Watcher treats as the gateway rather than
    /// an exportable service, rather than inferring it from a label as
    /// older single-gateway-per-cluster designs did.
    pub gateway_name: String,
    pub gateway_namespace: String,
    pub gateway_address: String,
    pub gateway_port: u16,
    pub gateway_identity: Option<String>,
    pub probe_spec: ProbeSpec,
    pub selector: BTreeMap<String, String>,
}

impl Link {
    /// Renders `selector` as a Kubernetes label-selector string, e.g.
    /// `"mirror.linkerd.io/exported=true,env=prod"`. An empty selector
    /// matches nothing, by design: an un-configured Link exports no
    /// services rather than exporting all of them.
    pub fn selector_string(&self) -> String {
        self.selector
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether a remote service's labels satisfy this Link's selector.
    pub fn matches(&self, remote_labels: &BTreeMap<String, String>) -> bool {
        if self.selector.is_empty() {
            return false;
        }
        self.selector
            .iter()
            .all(|(k, v)| remote_labels.get(k).map(String::as_str) == Some(v.as_str()))
    }
}
