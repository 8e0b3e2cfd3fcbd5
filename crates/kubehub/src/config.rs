//! Connection configuration and kubeconfig resolution.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub const ENV_CONFIG_PATHS: &str = "KUBE_CONFIG_PATHS";
pub const ENV_MASTER: &str = "KUBERNETES_MASTER";
pub const DEFAULT_CONFIG_PATH: &str = "~/.kube/config";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-connection settings supplied by the host. Read-only to the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub config_path: Option<String>,
    pub config_paths: Option<Vec<String>>,
    pub config_context: Option<String>,
}

impl ConnectionConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn context(&self) -> Option<&str> {
        self.config_context.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    ExplicitPath,
    ConfigPaths,
    EnvConfigPaths,
    EnvMaster,
    Default,
}

/// Kubeconfig files to load, in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeconfigSource {
    pub paths: Vec<PathBuf>,
    pub origin: SourceOrigin,
}

/// A materialized REST configuration plus the context it was built from.
#[derive(Clone)]
pub struct RestConfig {
    pub config: kube::Config,
    /// Active context; `None` when running in-cluster.
    pub context: Option<String>,
}

impl std::fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestConfig")
            .field("cluster_url", &self.config.cluster_url.to_string())
            .field("context", &self.context)
            .finish()
    }
}

/// Pick the kubeconfig source. `env` is injected so resolution can be tested
/// without touching the process environment.
pub fn resolve_source(cfg: &ConnectionConfig, env: impl Fn(&str) -> Option<String>) -> KubeconfigSource {
    if let Some(p) = cfg.config_path.as_deref().filter(|s| !s.is_empty()) {
        return KubeconfigSource { paths: vec![expand_home(p)], origin: SourceOrigin::ExplicitPath };
    }
    if let Some(ps) = cfg.config_paths.as_ref() {
        let paths: Vec<PathBuf> = ps.iter().filter(|s| !s.is_empty()).map(|s| expand_home(s)).collect();
        if !paths.is_empty() {
            return KubeconfigSource { paths, origin: SourceOrigin::ConfigPaths };
        }
    }
    if let Some(v) = env(ENV_CONFIG_PATHS).filter(|s| !s.is_empty()) {
        let paths: Vec<PathBuf> = std::env::split_paths(&v)
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| expand_home(&p.to_string_lossy()))
            .collect();
        if !paths.is_empty() {
            return KubeconfigSource { paths, origin: SourceOrigin::EnvConfigPaths };
        }
    }
    if let Some(v) = env(ENV_MASTER).filter(|s| !s.is_empty()) {
        return KubeconfigSource { paths: vec![expand_home(&v)], origin: SourceOrigin::EnvMaster };
    }
    KubeconfigSource { paths: vec![expand_home(DEFAULT_CONFIG_PATH)], origin: SourceOrigin::Default }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn is_missing_file(err: &KubeconfigError) -> bool {
    matches!(err, KubeconfigError::ReadConfig(io, _) if io.kind() == ErrorKind::NotFound)
}

/// Read and merge the files of `source`. Later files only fill gaps left by
/// earlier ones. In a multi-file list, missing files are skipped.
fn read_kubeconfig(source: &KubeconfigSource) -> std::result::Result<Kubeconfig, KubeconfigError> {
    if let [single] = source.paths.as_slice() {
        return Kubeconfig::read_from(single);
    }
    let mut merged: Option<Kubeconfig> = None;
    let mut last_missing = None;
    for path in &source.paths {
        match Kubeconfig::read_from(path) {
            Ok(kc) => {
                merged = Some(match merged {
                    Some(acc) => acc.merge(kc)?,
                    None => kc,
                });
            }
            Err(e) if is_missing_file(&e) => {
                debug!(path = %path.display(), "kubeconfig missing, skipping");
                last_missing = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    match (merged, last_missing) {
        (Some(kc), _) => Ok(kc),
        (None, Some(e)) => Err(e),
        (None, None) => Err(KubeconfigError::ReadConfig(ErrorKind::NotFound.into(), PathBuf::new())),
    }
}

async fn from_kubeconfig(source: &KubeconfigSource, context: Option<&str>) -> std::result::Result<RestConfig, KubeconfigError> {
    let kubeconfig = read_kubeconfig(source)?;
    let active = context.map(str::to_string).or_else(|| kubeconfig.current_context.clone());
    let options = KubeConfigOptions { context: context.map(str::to_string), ..Default::default() };
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?;
    Ok(RestConfig { config, context: active })
}

/// Materialize a REST configuration for `cfg`, reading the process environment.
pub async fn load_rest_config(cfg: &ConnectionConfig) -> Result<RestConfig> {
    load_rest_config_with(cfg, |k| std::env::var(k).ok()).await
}

pub async fn load_rest_config_with(cfg: &ConnectionConfig, env: impl Fn(&str) -> Option<String>) -> Result<RestConfig> {
    let source = resolve_source(cfg, env);
    debug!(origin = ?source.origin, paths = ?source.paths, context = ?cfg.context(), "resolving kubeconfig");
    let mut rest = match from_kubeconfig(&source, cfg.context()).await {
        Ok(rest) => rest,
        Err(e) if source.origin == SourceOrigin::Default && is_missing_file(&e) => {
            warn!(error = %e, "default kubeconfig not found, trying in-cluster config");
            match kube::Config::incluster() {
                Ok(config) => RestConfig { config, context: None },
                Err(ic) => return Err(Error::Config(format!("{}, {}", e, ic))),
            }
        }
        Err(e) => return Err(e.into()),
    };
    // kube fills in its own defaults; ours replace them.
    rest.config.connect_timeout = Some(CONNECT_TIMEOUT);
    rest.config.read_timeout = Some(READ_TIMEOUT);
    info!(cluster = %rest.config.cluster_url, context = ?rest.context, "cluster configuration loaded");
    Ok(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev
  cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
- name: prod
  cluster:
    server: https://10.0.0.1:6443
    insecure-skip-tls-verify: true
users:
- name: dev
  user:
    token: dev-token
- name: prod
  user:
    token: prod-token
contexts:
- name: dev
  context:
    cluster: dev
    user: dev
- name: prod
  context:
    cluster: prod
    user: prod
"#;

    #[test]
    fn explicit_path_wins_over_everything() {
        let cfg = ConnectionConfig {
            config_path: Some("/a/config".into()),
            config_paths: Some(vec!["/b/config".into()]),
            config_context: None,
        };
        let src = resolve_source(&cfg, env_of(&[(ENV_CONFIG_PATHS, "/c"), (ENV_MASTER, "/d")]));
        assert_eq!(src.origin, SourceOrigin::ExplicitPath);
        assert_eq!(src.paths, vec![PathBuf::from("/a/config")]);
    }

    #[test]
    fn config_paths_then_env_then_master_then_default() {
        let cfg = ConnectionConfig { config_paths: Some(vec!["/b1".into(), "/b2".into()]), ..Default::default() };
        let src = resolve_source(&cfg, env_of(&[(ENV_CONFIG_PATHS, "/c")]));
        assert_eq!(src.origin, SourceOrigin::ConfigPaths);
        assert_eq!(src.paths.len(), 2);

        let empty = ConnectionConfig { config_paths: Some(vec![]), ..Default::default() };
        let joined = std::env::join_paths(["/c1", "/c2"]).unwrap();
        let src = resolve_source(&empty, env_of(&[(ENV_CONFIG_PATHS, &joined.to_string_lossy()), (ENV_MASTER, "/d")]));
        assert_eq!(src.origin, SourceOrigin::EnvConfigPaths);
        assert_eq!(src.paths, vec![PathBuf::from("/c1"), PathBuf::from("/c2")]);

        let src = resolve_source(&empty, env_of(&[(ENV_MASTER, "/d")]));
        assert_eq!(src.origin, SourceOrigin::EnvMaster);
        assert_eq!(src.paths, vec![PathBuf::from("/d")]);

        let src = resolve_source(&ConnectionConfig::default(), env_of(&[]));
        assert_eq!(src.origin, SourceOrigin::Default);
        assert!(src.paths[0].ends_with(".kube/config"));
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x/config"), home.join("x/config"));
        }
        assert_eq!(expand_home("/abs/config"), PathBuf::from("/abs/config"));
    }

    #[test]
    fn connection_config_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conn.json");
        std::fs::write(&path, r#"{"config_path":"/tmp/kc","config_context":"prod"}"#).unwrap();
        let cfg = ConnectionConfig::load(&path).unwrap();
        assert_eq!(cfg.config_path.as_deref(), Some("/tmp/kc"));
        assert_eq!(cfg.context(), Some("prod"));
        assert!(cfg.config_paths.is_none());
    }

    #[tokio::test]
    async fn loads_temp_kubeconfig_with_context_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, KUBECONFIG).unwrap();

        let cfg = ConnectionConfig { config_path: Some(path.to_string_lossy().into_owned()), ..Default::default() };
        let rest = load_rest_config_with(&cfg, env_of(&[])).await.unwrap();
        assert_eq!(rest.context.as_deref(), Some("dev"));
        assert_eq!(rest.config.cluster_url.host(), Some("127.0.0.1"));
        assert_eq!(rest.config.connect_timeout, Some(CONNECT_TIMEOUT));
        assert_eq!(rest.config.read_timeout, Some(READ_TIMEOUT));

        let cfg = ConnectionConfig { config_context: Some("prod".into()), ..cfg };
        let rest = load_rest_config_with(&cfg, env_of(&[])).await.unwrap();
        assert_eq!(rest.context.as_deref(), Some("prod"));
        assert_eq!(rest.config.cluster_url.host(), Some("10.0.0.1"));
        assert_eq!(rest.config.connect_timeout, Some(Duration::from_secs(10)));
        assert_eq!(rest.config.read_timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn missing_files_in_multi_path_list_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("config");
        std::fs::write(&present, KUBECONFIG).unwrap();
        let missing = dir.path().join("absent");
        let cfg = ConnectionConfig {
            config_paths: Some(vec![missing.to_string_lossy().into_owned(), present.to_string_lossy().into_owned()]),
            ..Default::default()
        };
        let rest = load_rest_config_with(&cfg, env_of(&[])).await.unwrap();
        assert_eq!(rest.context.as_deref(), Some("dev"));
    }

    #[tokio::test]
    async fn missing_explicit_file_is_fatal() {
        let cfg = ConnectionConfig { config_path: Some("/definitely/not/here/config".into()), ..Default::default() };
        let err = load_rest_config_with(&cfg, env_of(&[])).await.unwrap_err();
        assert!(matches!(err, Error::Kubeconfig(_)));
    }
}
