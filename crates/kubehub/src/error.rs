/// Errors surfaced to the host. Not-found on `get` is not an error; it is `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no usable cluster configuration: {0}")]
    Config(String),
    #[error("kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
    #[error("in-cluster config: {0}")]
    InCluster(#[from] kube::config::InClusterError),
    #[error("kube api: {0}")]
    Api(#[from] kube::Error),
    #[error("session cache entry `{0}` holds a different type")]
    CacheType(String),
    #[error("serializing object: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
