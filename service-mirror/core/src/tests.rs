use crate::gateway::probe_key;
use crate::labels::{is_mirror_for_cluster, mirror_name, remote_fq_name};
use crate::link::Link;
use std::collections::BTreeMap;

fn link(selector: &[(&str, &str)]) -> Link {
    Link {
        cluster_name: "remote".to_string(),
        cluster_domain: "cluster.local".to_string(),
        gateway_name: "linkerd-gateway".to_string(),
        gateway_namespace: "linkerd-multicluster".to_string(),
        gateway_address: "gateway.remote.svc".to_string(),
        gateway_port: 4143,
        gateway_identity: None,
        probe_spec: Default::default(),
        selector: selector.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    }
}

#[test]
fn mirror_name_joins_remote_and_cluster() {
    assert_eq!(mirror_name("svc-one", "remote"), "svc-one-remote");
}

#[test]
fn remote_fq_name_is_cluster_local_dns() {
    assert_eq!(
        remote_fq_name("svc-one", "ns1", "cluster.local"),
        "svc-one.ns1.svc.cluster.local"
    );
}

#[test]
fn empty_selector_matches_nothing() {
    let link = link(&[]);
    let labels = BTreeMap::new();
    assert!(!link.matches(&labels));
}

#[test]
fn selector_requires_every_pair() {
    let link = link(&[("mirror.linkerd.io/exported", "true"), ("env", "prod")]);
    let mut labels = BTreeMap::new();
    labels.insert("mirror.linkerd.io/exported".to_string(), "true".to_string());
    assert!(!link.matches(&labels), "missing env=prod should not match");

    labels.insert("env".to_string(), "prod".to_string());
    assert!(link.matches(&labels));

    labels.insert("env".to_string(), "staging".to_string());
    assert!(!link.matches(&labels), "mismatched value should not match");
}

#[test]
fn probe_key_orders_namespace_before_name() {
    assert_eq!(probe_key("ns2", "gw", "remote"), "ns2-gw-remote");
}

#[test]
fn is_mirror_for_cluster_checks_both_label_and_value() {
    let mut labels = BTreeMap::new();
    labels.insert("mirror.linkerd.io/mirrored-resource".to_string(), "true".to_string());
    labels.insert("mirror.linkerd.io/cluster-name".to_string(), "remote".to_string());
    assert!(is_mirror_for_cluster(&labels, "remote"));
    assert!(!is_mirror_for_cluster(&labels, "other"));
}
