//! Gateway resolution: extracting a usable [`GatewaySpec`] from a remote
//! gateway Service.
//!
//! Failure to resolve is never fatal to the caller: it returns `None` and
//! the reconciler proceeds with an empty-subset mirror.

use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use service_mirror_core::{labels::GATEWAY_PORT_NAME, GatewaySpec, Link, ProbeSpec};

/// Extracts a [`GatewaySpec`] from the remote gateway Service, or `None` if
/// it carries no LoadBalancer ingress yet or no port named
/// [`GATEWAY_PORT_NAME`].
pub fn resolve(remote_gateway: &Service, link: &Link) -> Option<GatewaySpec> {
    let status = remote_gateway.status.as_ref()?;
    let ingress = status.load_balancer.as_ref()?.ingress.as_ref()?;
    if ingress.is_empty() {
        return None;
    }
    let addresses: Vec<String> = ingress
        .iter()
        .filter_map(|i| i.ip.clone().or_else(|| i.hostname.clone()))
        .collect();
    if addresses.is_empty() {
        return None;
    }

    let incoming_port = remote_gateway
        .spec
        .as_ref()?
        .ports
        .as_ref()?
        .iter()
        .find(|p| p.name.as_deref() == Some(GATEWAY_PORT_NAME))
        .map(|p| p.port as u16)?;

    Some(GatewaySpec {
        name: remote_gateway.name_any(),
        namespace: remote_gateway.namespace().unwrap_or_default(),
        cluster_name: link.cluster_name.clone(),
        addresses,
        incoming_port,
        resource_version: remote_gateway.resource_version().unwrap_or_default(),
        identity: link.gateway_identity.clone(),
        probe_spec: ProbeSpec {
            path: link.probe_spec.path.clone(),
            port: link.probe_spec.port,
            period: link.probe_spec.period,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServicePort, ServiceSpec, ServiceStatus};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn link() -> Link {
        Link {
            cluster_name: "remote".to_string(),
            cluster_domain: "cluster.local".to_string(),
            gateway_name: "gw".to_string(),
            gateway_namespace: "ns2".to_string(),
            gateway_address: "gw.remote.svc".to_string(),
            gateway_port: 4143,
            gateway_identity: Some("gateway.remote.serviceaccount.identity".to_string()),
            probe_spec: service_mirror_core::ProbeSpec {
                path: "/probe".to_string(),
                port: 12345,
                period: Duration::from_secs(10),
            },
            selector: BTreeMap::new(),
        }
    }

    fn gateway_service(ingress: Vec<LoadBalancerIngress>, port_name: Option<&str>, port: i32) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("gw".to_string()),
                namespace: Some("ns2".to_string()),
                resource_version: Some("222".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: port_name.map(str::to_string),
                    port,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(ingress),
                }),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn resolves_ip_and_named_port() {
        let svc = gateway_service(
            vec![LoadBalancerIngress {
                ip: Some("192.0.2.127".to_string()),
                ..Default::default()
            }],
            Some(GATEWAY_PORT_NAME),
            888,
        );
        let gw = resolve(&svc, &link()).expect("should resolve");
        assert_eq!(gw.addresses, vec!["192.0.2.127".to_string()]);
        assert_eq!(gw.incoming_port, 888);
        assert_eq!(gw.resource_version, "222");
    }

    #[test]
    fn zero_ingress_does_not_resolve() {
        let svc = gateway_service(vec![], Some(GATEWAY_PORT_NAME), 888);
        assert!(resolve(&svc, &link()).is_none());
    }

    #[test]
    fn missing_named_port_does_not_resolve() {
        let svc = gateway_service(
            vec![LoadBalancerIngress {
                ip: Some("192.0.2.127".to_string()),
                ..Default::default()
            }],
            Some("other-port"),
            888,
        );
        assert!(resolve(&svc, &link()).is_none());
    }

    #[test]
    fn hostname_ingress_is_accepted() {
        let svc = gateway_service(
            vec![LoadBalancerIngress {
                hostname: Some("gw.example.com".to_string()),
                ..Default::default()
            }],
            Some(GATEWAY_PORT_NAME),
            888,
        );
        let gw = resolve(&svc, &link()).expect("should resolve via hostname");
        assert_eq!(gw.addresses, vec!["gw.example.com".to_string()]);
    }
}
