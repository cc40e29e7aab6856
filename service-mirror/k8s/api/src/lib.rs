//! Typed, cached access to the Kubernetes API used by the multicluster
//! service-mirror controller: the `Link` CRD and the Local API façade.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod link;
pub mod local;

pub use k8s_openapi::{
    api::core::v1::{
        Endpoints, EndpointsSubset, LoadBalancerIngress, LoadBalancerStatus, Namespace, Secret,
        Service, ServicePort, ServiceSpec, ServiceStatus,
    },
    apimachinery::pkg::util::intstr::IntOrString,
};
pub use kube::{
    api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams, PostParams, Resource, ResourceExt},
    runtime::watcher,
    Client, Error,
};

pub use link::{kubeconfig_bytes, parse_link, remote_client_from_kubeconfig, Link, LinkSpec};
pub use local::LocalApi;
