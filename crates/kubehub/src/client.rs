//! Cluster client factory.
//!
//! Three client flavors share one kubeconfig load. Every handle is built at
//! most once per connection and then served from the [`SessionCache`].

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::Client;
use tracing::{debug, info};

use crate::cache::SessionCache;
use crate::config::{load_rest_config, ConnectionConfig, RestConfig};
use crate::error::Result;

const REST_CONFIG_KEY: &str = "kubeconfig";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientFlavor {
    Typed,
    Crd,
    Dynamic,
}

impl ClientFlavor {
    pub fn cache_key(self) -> &'static str {
        match self {
            ClientFlavor::Typed => "client/typed",
            ClientFlavor::Crd => "client/crd",
            ClientFlavor::Dynamic => "client/dynamic",
        }
    }
}

/// Client for the built-in, statically typed resources.
#[derive(Clone)]
pub struct TypedClient(Client);

impl TypedClient {
    pub fn kube(&self) -> &Client {
        &self.0
    }
}

/// Client for the apiextensions group.
#[derive(Clone)]
pub struct CrdClient(Client);

impl CrdClient {
    pub fn crds(&self) -> Api<CustomResourceDefinition> {
        Api::all(self.0.clone())
    }
}

/// Schema-less client addressing any group/version/resource.
#[derive(Clone)]
pub struct DynamicClient(Client);

impl DynamicClient {
    pub fn resource(&self, ar: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.0.clone(), ns, ar),
            None => Api::all_with(self.0.clone(), ar),
        }
    }
}

#[derive(Clone)]
pub enum ClientHandle {
    Typed(Arc<TypedClient>),
    Crd(Arc<CrdClient>),
    Dynamic(Arc<DynamicClient>),
}

impl ClientHandle {
    pub fn kube(&self) -> &Client {
        match self {
            ClientHandle::Typed(c) => &c.0,
            ClientHandle::Crd(c) => &c.0,
            ClientHandle::Dynamic(c) => &c.0,
        }
    }
}

/// Produces the REST configuration for a connection.
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    async fn load(&self, connection: &ConnectionConfig) -> Result<RestConfig>;
}

/// Loads from kubeconfig files, falling back to in-cluster config.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeconfigLoader;

#[async_trait]
impl ConfigLoader for KubeconfigLoader {
    async fn load(&self, connection: &ConnectionConfig) -> Result<RestConfig> {
        load_rest_config(connection).await
    }
}

#[derive(Clone)]
pub struct ClientFactory {
    connection: ConnectionConfig,
    cache: SessionCache,
    loader: Arc<dyn ConfigLoader>,
}

impl ClientFactory {
    pub fn new(connection: ConnectionConfig, cache: SessionCache) -> Self {
        Self::with_loader(connection, cache, Arc::new(KubeconfigLoader))
    }

    pub fn with_loader(connection: ConnectionConfig, cache: SessionCache, loader: Arc<dyn ConfigLoader>) -> Self {
        Self { connection, cache, loader }
    }

    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub async fn rest_config(&self) -> Result<Arc<RestConfig>> {
        self.cache.get_or_try_init(REST_CONFIG_KEY, || self.loader.load(&self.connection)).await
    }

    /// Active kubeconfig context; `None` in-cluster.
    pub async fn context_name(&self) -> Result<Option<String>> {
        Ok(self.rest_config().await?.context.clone())
    }

    async fn kube_client(&self, flavor: ClientFlavor) -> Result<Client> {
        let rest = self.rest_config().await?;
        let client = Client::try_from(rest.config.clone())?;
        info!(flavor = ?flavor, cluster = %rest.config.cluster_url, "cluster client created");
        Ok(client)
    }

    pub async fn typed(&self) -> Result<Arc<TypedClient>> {
        let key = ClientFlavor::Typed.cache_key();
        self.cache.get_or_try_init(key, || async { Ok(TypedClient(self.kube_client(ClientFlavor::Typed).await?)) }).await
    }

    pub async fn crd(&self) -> Result<Arc<CrdClient>> {
        let key = ClientFlavor::Crd.cache_key();
        self.cache.get_or_try_init(key, || async { Ok(CrdClient(self.kube_client(ClientFlavor::Crd).await?)) }).await
    }

    pub async fn dynamic(&self) -> Result<Arc<DynamicClient>> {
        let key = ClientFlavor::Dynamic.cache_key();
        self.cache.get_or_try_init(key, || async { Ok(DynamicClient(self.kube_client(ClientFlavor::Dynamic).await?)) }).await
    }

    pub async fn client(&self, flavor: ClientFlavor) -> Result<ClientHandle> {
        debug!(flavor = ?flavor, "client requested");
        Ok(match flavor {
            ClientFlavor::Typed => ClientHandle::Typed(self.typed().await?),
            ClientFlavor::Crd => ClientHandle::Crd(self.crd().await?),
            ClientFlavor::Dynamic => ClientHandle::Dynamic(self.dynamic().await?),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Loader that points at an address nothing listens on and counts calls.
    #[derive(Default)]
    pub(crate) struct CountingLoader {
        pub(crate) loads: AtomicUsize,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl ConfigLoader for CountingLoader {
        async fn load(&self, _connection: &ConnectionConfig) -> Result<RestConfig> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Config("no kubeconfig".into()));
            }
            let config = kube::Config::new("http://127.0.0.1:6443".parse().unwrap());
            Ok(RestConfig { config, context: Some("test-ctx".into()) })
        }
    }

    pub(crate) fn factory(loader: Arc<CountingLoader>) -> ClientFactory {
        ClientFactory::with_loader(ConnectionConfig::default(), SessionCache::new(), loader)
    }

    #[tokio::test]
    async fn handles_are_cached_per_flavor() {
        let loader = Arc::new(CountingLoader::default());
        let clients = factory(loader.clone());
        let a = clients.typed().await.unwrap();
        let b = clients.typed().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        clients.crd().await.unwrap();
        clients.dynamic().await.unwrap();
        assert!(matches!(clients.client(ClientFlavor::Dynamic).await.unwrap(), ClientHandle::Dynamic(_)));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(clients.cache().len().await, 4);
        assert_eq!(clients.context_name().await.unwrap().as_deref(), Some("test-ctx"));
    }

    #[tokio::test]
    async fn load_failure_is_returned_and_retried() {
        let loader = Arc::new(CountingLoader { fail: true, ..Default::default() });
        let clients = factory(loader.clone());
        assert!(matches!(clients.typed().await, Err(Error::Config(_))));
        assert!(clients.crd().await.is_err());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert!(!clients.cache().contains(ClientFlavor::Typed.cache_key()).await);
    }
}
