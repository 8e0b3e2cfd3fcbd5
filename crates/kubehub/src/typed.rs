//! Listing and fetching of statically typed `k8s-openapi` resources.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::ops::ControlFlow;

use async_trait::async_trait;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{ClientFactory, ClientFlavor};
use crate::error::Result;
use crate::paginate::{paginate, ListOutcome, ListPlan};
use crate::table::{GetKeys, TableSource};

/// Bounds every typed resource served as a table must satisfy.
pub trait TypedResource:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static
{
}

impl<K> TypedResource for K where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static
{
}

/// How a resource is addressed for get-by-key.
pub trait Scope<K>: Send + Sync + 'static {
    const KEYS: GetKeys;

    /// `None` when the key does not identify a single object.
    fn get_api(client: Client, namespace: Option<&str>) -> Option<Api<K>>;
}

pub struct Namespaced;
pub struct ClusterScoped;

impl<K> Scope<K> for Namespaced
where
    K: TypedResource + Resource<Scope = NamespaceResourceScope>,
{
    const KEYS: GetKeys = GetKeys::NameAndNamespace;

    fn get_api(client: Client, namespace: Option<&str>) -> Option<Api<K>> {
        namespace.map(|ns| Api::namespaced(client, ns))
    }
}

impl<K> Scope<K> for ClusterScoped
where
    K: TypedResource + Resource<Scope = ClusterResourceScope>,
{
    const KEYS: GetKeys = GetKeys::Name;

    fn get_api(client: Client, _namespace: Option<&str>) -> Option<Api<K>> {
        Some(Api::all(client))
    }
}

/// Table source backed by one typed resource kind.
pub struct TypedSource<K, S> {
    flavor: ClientFlavor,
    _marker: PhantomData<fn() -> (K, S)>,
}

impl<K, S> TypedSource<K, S> {
    pub fn new(flavor: ClientFlavor) -> Self {
        Self { flavor, _marker: PhantomData }
    }
}

fn to_object<K: Serialize>(obj: &K) -> Option<Value> {
    match serde_json::to_value(obj) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "object could not be serialized");
            None
        }
    }
}

/// List every object of `K` across namespaces, streaming each as JSON.
pub async fn list_typed<K, F>(client: Client, plan: &ListPlan, cancel: &CancellationToken, mut emit: F) -> Result<ListOutcome>
where
    K: TypedResource,
    F: FnMut(Value) -> ControlFlow<()> + Send,
{
    let api: Api<K> = Api::all(client);
    debug!(kind = %K::kind(&()), selector = ?plan.field_selector, limit = ?plan.limit, "typed list");
    paginate(&api, plan, cancel, |obj| match to_object(&obj) {
        Some(v) => emit(v),
        None => ControlFlow::Continue(()),
    })
    .await
}

#[async_trait]
impl<K, S> TableSource for TypedSource<K, S>
where
    K: TypedResource,
    S: Scope<K>,
{
    async fn list(
        &self,
        clients: &ClientFactory,
        plan: &ListPlan,
        cancel: &CancellationToken,
        emit: &mut (dyn FnMut(Value) -> ControlFlow<()> + Send),
    ) -> Result<ListOutcome> {
        let handle = clients.client(self.flavor).await?;
        list_typed::<K, _>(handle.kube().clone(), plan, cancel, emit).await
    }

    async fn get(&self, clients: &ClientFactory, name: &str, namespace: Option<&str>) -> Result<Option<Value>> {
        let handle = clients.client(self.flavor).await?;
        let Some(api) = S::get_api(handle.kube().clone(), namespace) else {
            return Ok(None);
        };
        // 404 -> None via get_opt.
        Ok(api.get_opt(name).await?.as_ref().and_then(to_object::<K>))
    }

    fn get_keys(&self) -> Option<GetKeys> {
        Some(S::KEYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Namespace, Pod};

    #[test]
    fn keys_follow_scope() {
        assert_eq!(TypedSource::<Pod, Namespaced>::new(ClientFlavor::Typed).get_keys(), Some(GetKeys::NameAndNamespace));
        assert_eq!(TypedSource::<Namespace, ClusterScoped>::new(ClientFlavor::Typed).get_keys(), Some(GetKeys::Name));
    }

    #[test]
    fn typed_objects_serialize_with_type_meta() {
        let mut pod = Pod::default();
        pod.metadata.name = Some("web-0".into());
        let v = to_object(&pod).unwrap();
        assert_eq!(v["kind"], "Pod");
        assert_eq!(v["apiVersion"], "v1");
        assert_eq!(v["metadata"]["name"], "web-0");
    }
}
