//! Cached, typed read access over the local cluster, plus a thin write
//! path.
//!
//! Reads are served from a `kube::runtime::reflector::Store` per resource
//! kind, populated by a background watch task. `policy-controller` builds
//! its own caches over `runtime.watch_all::<K>()` fed into
//! `kubert::index::namespaced`; this façade needs a plain cross-namespace
//! key/value store rather than a per-namespace `Index` impl, so it drives
//! `kube::runtime::reflector` directly instead — the same watch-and-cache
//! shape, one layer lower. `Store::get`/`Store::state` hand back `Arc<T>`,
//! which reconcilers treat as already-owned copies — they never hold the
//! lock across a mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Secret, Service};
use kube::{
    api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams, PostParams},
    runtime::{reflector, watcher, WatchStreamExt},
    Client, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use service_mirror_core::ApiError;

use crate::link::Link;

const FIELD_MANAGER: &str = "service-mirror";

fn map_kube_err(err: kube::Error) -> ApiError {
    match &err {
        kube::Error::Api(resp) if resp.code == 404 => ApiError::NotFound,
        kube::Error::Api(resp) if resp.code == 409 => ApiError::AlreadyExists,
        _ => ApiError::Transient(err.to_string()),
    }
}

/// A reflector-backed cache for one namespaced resource kind.
struct Cache<K>
where
    K: Resource<DynamicType = ()> + Clone + std::fmt::Debug + Send + Sync + DeserializeOwned + 'static,
{
    reader: reflector::Store<K>,
    _watcher: JoinHandle<()>,
}

impl<K> Cache<K>
where
    K: Resource<DynamicType = ()> + Clone + std::fmt::Debug + Send + Sync + DeserializeOwned + 'static,
{
    fn spawn(client: Client) -> Self {
        let (reader, writer) = reflector::store();
        let stream = watcher(Api::<K>::all(client), watcher::Config::default())
            .default_backoff()
            .reflect(writer)
            .applied_objects()
            .boxed();
        let watcher_task = tokio::spawn(async move {
            stream.for_each(|_| futures::future::ready(())).await;
        });
        Self {
            reader,
            _watcher: watcher_task,
        }
    }

    fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        let key = reflector::ObjectRef::new(name).within(namespace);
        self.reader.get(&key)
    }

    fn list_matching(&self, selector: &BTreeMap<String, String>) -> Vec<Arc<K>> {
        self.reader
            .state()
            .into_iter()
            .filter(|obj| labels_match(obj.meta().labels.as_ref(), selector))
            .collect()
    }

    async fn ready(&self) {
        // Only the writer dropping can fail this; the watcher task owns it
        // for the controller's lifetime.
        let _ = self.reader.wait_until_ready().await;
    }
}

fn labels_match(labels: Option<&BTreeMap<String, String>>, selector: &BTreeMap<String, String>) -> bool {
    if selector.is_empty() {
        return true;
    }
    match labels {
        None => false,
        Some(labels) => selector
            .iter()
            .all(|(k, v)| labels.get(k).map(String::as_str) == Some(v.as_str())),
    }
}

/// Cached, typed read access to the local cluster, with a thin write path
/// that proxies create/update/delete for mirror resources.
pub struct LocalApi {
    client: Client,
    services: Cache<Service>,
    endpoints: Cache<Endpoints>,
    namespaces: Cache<Namespace>,
}

impl LocalApi {
    pub fn new(client: Client) -> Self {
        Self {
            services: Cache::spawn(client.clone()),
            endpoints: Cache::spawn(client.clone()),
            namespaces: Cache::spawn(client.clone()),
            client,
        }
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Blocks until every informer cache has completed its initial list, or
    /// `stop` fires first. Returns `false` if `stop` won.
    pub async fn sync(&self, mut stop: watch::Receiver<bool>) -> bool {
        let ready = async {
            self.services.ready().await;
            self.endpoints.ready().await;
            self.namespaces.ready().await;
        };
        tokio::select! {
            _ = ready => true,
            _ = stop.changed() => false,
        }
    }

    pub fn get_service(&self, namespace: &str, name: &str) -> Option<Arc<Service>> {
        self.services.get(namespace, name)
    }

    pub fn get_endpoints(&self, namespace: &str, name: &str) -> Option<Arc<Endpoints>> {
        self.endpoints.get(namespace, name)
    }

    pub fn get_namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get("", name)
    }

    pub fn list_services(&self, selector: &BTreeMap<String, String>) -> Vec<Arc<Service>> {
        self.services.list_matching(selector)
    }

    pub fn list_endpoints(&self, selector: &BTreeMap<String, String>) -> Vec<Arc<Endpoints>> {
        self.endpoints.list_matching(selector)
    }

    pub fn list_namespaces(&self, selector: &BTreeMap<String, String>) -> Vec<Arc<Namespace>> {
        self.namespaces.list_matching(selector)
    }

    pub async fn create_service(&self, namespace: &str, svc: Service) -> Result<Service, ApiError> {
        Api::<Service>::namespaced(self.client.clone(), namespace)
            .create(&PostParams::default(), &svc)
            .await
            .map_err(map_kube_err)
    }

    pub async fn apply_service(&self, namespace: &str, svc: Service) -> Result<Service, ApiError> {
        let name = svc.name_any();
        let params = PatchParams::apply(FIELD_MANAGER).force();
        Api::<Service>::namespaced(self.client.clone(), namespace)
            .patch(&name, &params, &Patch::Apply(&svc))
            .await
            .map_err(map_kube_err)
    }

    pub async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        Api::<Service>::namespaced(self.client.clone(), namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(map_kube_err)
    }

    pub async fn create_endpoints(&self, namespace: &str, ep: Endpoints) -> Result<Endpoints, ApiError> {
        Api::<Endpoints>::namespaced(self.client.clone(), namespace)
            .create(&PostParams::default(), &ep)
            .await
            .map_err(map_kube_err)
    }

    pub async fn apply_endpoints(&self, namespace: &str, ep: Endpoints) -> Result<Endpoints, ApiError> {
        let name = ep.name_any();
        let params = PatchParams::apply(FIELD_MANAGER).force();
        Api::<Endpoints>::namespaced(self.client.clone(), namespace)
            .patch(&name, &params, &Patch::Apply(&ep))
            .await
            .map_err(map_kube_err)
    }

    pub async fn delete_endpoints(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        Api::<Endpoints>::namespaced(self.client.clone(), namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(map_kube_err)
    }

    /// Creates `namespace` with the mirrored-namespace label if it does not
    /// already exist locally.
    pub async fn ensure_mirrored_namespace(&self, namespace: &str) -> Result<(), ApiError> {
        if self.get_namespace(namespace).is_some() {
            return Ok(());
        }
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                labels: Some(
                    [(
                        service_mirror_core::labels::LABEL_MIRRORED_NAMESPACE.to_string(),
                        "true".to_string(),
                    )]
                    .into_iter()
                    .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        match Api::<Namespace>::all(self.client.clone())
            .create(&PostParams::default(), &ns)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = map_kube_err(err);
                if err.is_absorbable_on_create() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Deletes `namespace`, absorbing `NotFound` as success. Callers are
    /// expected to have already confirmed the namespace carries
    /// `LABEL_MIRRORED_NAMESPACE` and holds no remaining mirror Services.
    pub async fn delete_namespace(&self, namespace: &str) -> Result<(), ApiError> {
        match Api::<Namespace>::all(self.client.clone())
            .delete(namespace, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = map_kube_err(err);
                if err.is_absorbable_on_delete() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// A live stream of `Link` ADD/UPDATE/DELETE events.
    pub fn watch_links(
        &self,
    ) -> impl Stream<Item = Result<watcher::Event<Link>, watcher::Error>> + Send {
        watcher(Api::<Link>::all(self.client.clone()), watcher::Config::default())
    }

    /// A live stream of credential-carrying `Secret` ADD/UPDATE/DELETE
    /// events, restricted to Secrets annotated as Link credentials.
    pub fn watch_secrets(
        &self,
    ) -> impl Stream<Item = Result<watcher::Event<Secret>, watcher::Error>> + Send {
        watcher(Api::<Secret>::all(self.client.clone()), watcher::Config::default())
    }
}
