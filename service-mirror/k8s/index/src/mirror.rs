//! Pure construction of mirror Service/Endpoints objects from a remote
//! Service and a resolved gateway.
//!
//! Kept free of any I/O so every invariant can be checked directly against
//! these functions' output in unit tests.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Service, ServicePort, ServiceSpec,
};
use kube::api::ObjectMeta;
use service_mirror_core::{labels, GatewaySpec};

/// Builds (or rebuilds) the mirror Service for `remote`, owned by
/// `cluster_name`, routed through `gateway` (or left gateway-less if
/// resolution failed).
pub fn build_mirror_service(
    remote_name: &str,
    remote_namespace: &str,
    remote_resource_version: &str,
    remote_ports: &[ServicePort],
    cluster_name: &str,
    cluster_domain: &str,
    gateway_name: &str,
    gateway_namespace: &str,
    gateway: Option<&GatewaySpec>,
) -> Service {
    let name = labels::mirror_name(remote_name, cluster_name);
    let ports: Vec<ServicePort> = remote_ports
        .iter()
        .cloned()
        .map(|mut p| {
            p.node_port = None;
            p
        })
        .collect();

    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(remote_namespace.to_string()),
            labels: Some(mirror_labels(cluster_name, gateway_name, gateway_namespace)),
            annotations: Some(mirror_annotations(
                remote_name,
                remote_namespace,
                remote_resource_version,
                cluster_domain,
                gateway,
            )),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(ports),
            ..Default::default()
        }),
        status: None,
    }
}

/// Builds (or rebuilds) the mirror Endpoints for a mirror Service, with
/// subsets populated from `gateway` or left empty when the gateway is
/// unresolved.
pub fn build_mirror_endpoints(
    mirror_name: &str,
    mirror_namespace: &str,
    mirror_ports: &[ServicePort],
    cluster_name: &str,
    gateway_name: &str,
    gateway_namespace: &str,
    gateway: Option<&GatewaySpec>,
) -> Endpoints {
    let subsets = gateway.map(|gw| {
        let addresses = gw
            .addresses
            .iter()
            .map(|ip| EndpointAddress {
                ip: ip.clone(),
                ..Default::default()
            })
            .collect();
        let ports = mirror_ports
            .iter()
            .map(|p| EndpointPort {
                name: p.name.clone(),
                protocol: p.protocol.clone(),
                port: gw.incoming_port as i32,
                ..Default::default()
            })
            .collect();
        vec![EndpointSubset {
            addresses: Some(addresses),
            not_ready_addresses: None,
            ports: Some(ports),
        }]
    });

    Endpoints {
        metadata: ObjectMeta {
            name: Some(mirror_name.to_string()),
            namespace: Some(mirror_namespace.to_string()),
            labels: Some(mirror_labels(cluster_name, gateway_name, gateway_namespace)),
            ..Default::default()
        },
        subsets,
    }
}

/// Endpoints with no subsets, for when the gateway is unresolved or
/// unreachable; used on `RemoteGatewayDeleted` and on creation when
/// resolution fails.
pub fn null_endpoints(
    mirror_name: &str,
    mirror_namespace: &str,
    cluster_name: &str,
    gateway_name: &str,
    gateway_namespace: &str,
) -> Endpoints {
    Endpoints {
        metadata: ObjectMeta {
            name: Some(mirror_name.to_string()),
            namespace: Some(mirror_namespace.to_string()),
            labels: Some(mirror_labels(cluster_name, gateway_name, gateway_namespace)),
            ..Default::default()
        },
        subsets: None,
    }
}

fn mirror_labels(
    cluster_name: &str,
    gateway_name: &str,
    gateway_namespace: &str,
) -> BTreeMap<String, String> {
    [
        (labels::LABEL_MIRRORED_RESOURCE.to_string(), "true".to_string()),
        (labels::LABEL_REMOTE_CLUSTER_NAME.to_string(), cluster_name.to_string()),
        (labels::LABEL_REMOTE_GATEWAY_NAME.to_string(), gateway_name.to_string()),
        (labels::LABEL_REMOTE_GATEWAY_NS.to_string(), gateway_namespace.to_string()),
    ]
    .into_iter()
    .collect()
}

fn mirror_annotations(
    remote_name: &str,
    remote_namespace: &str,
    remote_resource_version: &str,
    cluster_domain: &str,
    gateway: Option<&GatewaySpec>,
) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert(
        labels::ANNOTATION_REMOTE_RESOURCE_VERSION.to_string(),
        remote_resource_version.to_string(),
    );
    annotations.insert(
        labels::ANNOTATION_REMOTE_SERVICE_FQ_NAME.to_string(),
        labels::remote_fq_name(remote_name, remote_namespace, cluster_domain),
    );
    if let Some(gw) = gateway {
        annotations.insert(
            labels::ANNOTATION_REMOTE_GATEWAY_RESOURCE_VERSION.to_string(),
            gw.resource_version.clone(),
        );
    }
    annotations
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use std::time::Duration;

    fn gateway() -> GatewaySpec {
        GatewaySpec {
            name: "gw".to_string(),
            namespace: "ns2".to_string(),
            cluster_name: "remote".to_string(),
            addresses: vec!["192.0.2.127".to_string()],
            incoming_port: 888,
            resource_version: "222".to_string(),
            identity: None,
            probe_spec: service_mirror_core::ProbeSpec {
                path: "/probe".to_string(),
                port: 12345,
                period: Duration::from_secs(10),
            },
        }
    }

    fn ports() -> Vec<ServicePort> {
        vec![ServicePort {
            name: Some("http".to_string()),
            protocol: Some("TCP".to_string()),
            port: 80,
            target_port: Some(IntOrString::Int(8080)),
            node_port: Some(30080),
            ..Default::default()
        }]
    }

    #[test]
    fn mirror_service_strips_node_port_and_sets_annotations() {
        let svc = build_mirror_service(
            "svc-one",
            "ns1",
            "111",
            &ports(),
            "remote",
            "cluster.local",
            "gw",
            "ns2",
            Some(&gateway()),
        );
        assert_eq!(svc.metadata.name.as_deref(), Some("svc-one-remote"));
        let spec = svc.spec.unwrap();
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.port, 80);
        assert_eq!(port.node_port, None, "NodePort must be stripped");

        let annotations = svc.metadata.annotations.unwrap();
        assert_eq!(
            annotations.get(labels::ANNOTATION_REMOTE_RESOURCE_VERSION),
            Some(&"111".to_string())
        );
        assert_eq!(
            annotations.get(labels::ANNOTATION_REMOTE_SERVICE_FQ_NAME),
            Some(&"svc-one.ns1.svc.cluster.local".to_string())
        );
        assert_eq!(
            annotations.get(labels::ANNOTATION_REMOTE_GATEWAY_RESOURCE_VERSION),
            Some(&"222".to_string())
        );
    }

    #[test]
    fn mirror_service_omits_gateway_rv_when_unresolved() {
        let svc = build_mirror_service(
            "svc-one", "ns1", "111", &ports(), "remote", "cluster.local", "gw", "ns2", None,
        );
        let annotations = svc.metadata.annotations.unwrap();
        assert!(!annotations.contains_key(labels::ANNOTATION_REMOTE_GATEWAY_RESOURCE_VERSION));
    }

    #[test]
    fn endpoints_remap_every_port_to_gateway_incoming_port() {
        let mirror_ports = vec![
            ServicePort {
                name: Some("port1".to_string()),
                protocol: Some("TCP".to_string()),
                port: 555,
                ..Default::default()
            },
            ServicePort {
                name: Some("port2".to_string()),
                protocol: Some("TCP".to_string()),
                port: 666,
                ..Default::default()
            },
        ];
        let ep = build_mirror_endpoints(
            "svc-one-remote", "ns1", &mirror_ports, "remote", "gw", "ns2", Some(&gateway()),
        );
        let subset = &ep.subsets.unwrap()[0];
        for port in subset.ports.as_ref().unwrap() {
            assert_eq!(port.port, 888, "every port must remap to the gateway's incoming port");
        }
        assert_eq!(
            subset.addresses.as_ref().unwrap()[0].ip,
            "192.0.2.127".to_string()
        );
    }

    #[test]
    fn endpoints_are_empty_without_a_gateway() {
        let ep = build_mirror_endpoints("svc-one-remote", "ns1", &ports(), "remote", "gw", "ns2", None);
        assert!(ep.subsets.is_none(), "subsets must be empty when the gateway is unresolved");
    }
}
