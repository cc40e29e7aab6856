//! The `Link` custom resource: one per remote cluster, observed via the
//! local API.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use kube::{Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use service_mirror_core::{Link as DomainLink, LinkError, ProbeSpec};

/// `links.multicluster.linkerd.io`: describes one remote cluster's name,
/// domain, gateway, probe configuration and selector. Credentials are kept
/// out of band in a Secret named by `cluster_credentials_secret`, in the
/// same namespace as the Link.
#[derive(kube::CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "multicluster.linkerd.io",
    version = "v1alpha1",
    kind = "Link",
    namespaced,
    shortname = "link"
)]
#[cfg_attr(test, derive(Default))]
#[serde(rename_all = "camelCase")]
pub struct LinkSpec {
    pub target_cluster_name: String,
    pub target_cluster_domain: String,
    pub cluster_credentials_secret: String,
    pub gateway_name: String,
    pub gateway_namespace: String,
    pub gateway_address: String,
    pub gateway_port: u16,
    #[serde(default)]
    pub gateway_identity: Option<String>,
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
    #[serde(default = "default_probe_port")]
    pub probe_port: u16,
    #[serde(default = "default_probe_period_seconds")]
    pub probe_period_seconds: u64,
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
}

fn default_probe_path() -> String {
    "/live".to_string()
}

fn default_probe_port() -> u16 {
    4191
}

fn default_probe_period_seconds() -> u64 {
    10
}

/// The key under which a credentials Secret carries raw kubeconfig bytes.
pub const KUBECONFIG_SECRET_KEY: &str = "kubeconfig";

/// Parses a `Link` object into the crate-agnostic [`DomainLink`], failing
/// with a typed [`LinkError`] on any missing or malformed field.
pub fn parse_link(link: &Link) -> Result<DomainLink, LinkError> {
    let name = link.name_any();
    let spec = &link.spec;

    if spec.target_cluster_name.is_empty() {
        return Err(LinkError::MissingField(name, "targetClusterName"));
    }
    if spec.target_cluster_domain.is_empty() {
        return Err(LinkError::MissingField(name, "targetClusterDomain"));
    }
    if spec.gateway_address.is_empty() {
        return Err(LinkError::MissingField(name, "gatewayAddress"));
    }
    if spec.gateway_name.is_empty() {
        return Err(LinkError::MissingField(name, "gatewayName"));
    }
    if spec.gateway_namespace.is_empty() {
        return Err(LinkError::MissingField(name, "gatewayNamespace"));
    }
    if spec.gateway_port == 0 {
        return Err(LinkError::InvalidProbeSpec(
            name,
            "gatewayPort must be nonzero".to_string(),
        ));
    }
    if spec.probe_port == 0 || spec.probe_path.is_empty() {
        return Err(LinkError::InvalidProbeSpec(
            name,
            "probePath/probePort must be set".to_string(),
        ));
    }

    Ok(DomainLink {
        cluster_name: spec.target_cluster_name.clone(),
        cluster_domain: spec.target_cluster_domain.clone(),
        gateway_name: spec.gateway_name.clone(),
        gateway_namespace: spec.gateway_namespace.clone(),
        gateway_address: spec.gateway_address.clone(),
        gateway_port: spec.gateway_port,
        gateway_identity: spec.gateway_identity.clone(),
        probe_spec: ProbeSpec {
            path: spec.probe_path.clone(),
            port: spec.probe_port,
            period: Duration::from_secs(spec.probe_period_seconds.max(1)),
        },
        selector: spec.selector.clone(),
    })
}

/// Extracts the raw kubeconfig bytes named by a Link's
/// `cluster_credentials_secret` from the Secret that carries them.
pub fn kubeconfig_bytes(link: &Link, secret: &Secret) -> Result<Vec<u8>, LinkError> {
    let link_name = link.name_any();
    let secret_name = secret.name_any();
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(KUBECONFIG_SECRET_KEY))
        .map(|b| b.0.clone())
        .ok_or_else(|| LinkError::MissingKubeconfig(secret_name, link_name))
}

/// Builds a remote `kube::Client` from raw kubeconfig bytes.
pub async fn remote_client_from_kubeconfig(
    link_name: &str,
    secret_name: &str,
    kubeconfig: &[u8],
) -> Result<kube::Client, LinkError> {
    let text = std::str::from_utf8(kubeconfig).map_err(|e| {
        LinkError::InvalidKubeconfig(secret_name.to_string(), link_name.to_string(), e.to_string())
    })?;
    let kc = kube::config::Kubeconfig::from_yaml(text).map_err(|e| {
        LinkError::InvalidKubeconfig(secret_name.to_string(), link_name.to_string(), e.to_string())
    })?;
    let config = kube::Config::from_custom_kubeconfig(kc, &kube::config::KubeConfigOptions::default())
        .await
        .map_err(|e| {
            LinkError::InvalidKubeconfig(secret_name.to_string(), link_name.to_string(), e.to_string())
        })?;
    kube::Client::try_from(config).map_err(|e| {
        LinkError::InvalidKubeconfig(secret_name.to_string(), link_name.to_string(), e.to_string())
    })
}

impl Link {
    /// The dynamic type used when constructing `Api<Link>` handles.
    pub fn api_resource() -> <Link as Resource>::DynamicType {
        Default::default()
    }
}
