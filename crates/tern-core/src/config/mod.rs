//! Configuration for tern.
//!
//! A single [`TernConfig`] value is loaded once per invocation (file, then
//! environment overrides, then CLI flags) and passed by reference to every
//! component that needs it.

pub mod store;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use store::ConfigStore;

/// Default budget for single network calls.
pub const DEFAULT_NETWORK_SECS: u64 = 300;
/// Default budget for component metadata extraction.
pub const DEFAULT_EXTRACT_SECS: u64 = 300;
/// Docker Engine endpoint used when neither config nor `DOCKER_HOST` name one.
pub const DEFAULT_DOCKER_HOST: &str = "http://127.0.0.1:2375";

/// Root configuration structure for config.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TernConfig {
    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub cluster: ClusterSettings,

    #[serde(default)]
    pub docker: DockerSettings,

    #[serde(default)]
    pub kind: KindSettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

/// Container registry the component images are published to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Registry host (and optional path prefix), e.g. `ghcr.io/acme`
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    /// Token used for pushes, manifest checks and the image pull secret
    #[serde(default)]
    pub token: Option<String>,

    /// Reach the registry over plain HTTP (loopback hosts always are)
    #[serde(default)]
    pub plain_http: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// API server URL, e.g. `https://127.0.0.1:6443`
    #[serde(default)]
    pub server: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    /// Remembered platform namespace
    #[serde(default)]
    pub namespace: Option<String>,

    /// Remembered platform name
    #[serde(default)]
    pub platform: Option<String>,

    /// Skip TLS verification (local clusters with self-signed certs)
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerSettings {
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindSettings {
    #[serde(default)]
    pub cluster_name: Option<String>,

    /// Side-load every image into the kind cluster, even without `--kind`
    #[serde(default)]
    pub always_load: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_network_secs")]
    pub network_secs: u64,

    #[serde(default = "default_extract_secs")]
    pub extract_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            network_secs: DEFAULT_NETWORK_SECS,
            extract_secs: DEFAULT_EXTRACT_SECS,
        }
    }
}

fn default_network_secs() -> u64 {
    DEFAULT_NETWORK_SECS
}

fn default_extract_secs() -> u64 {
    DEFAULT_EXTRACT_SECS
}

impl TimeoutSettings {
    pub fn network(&self) -> Duration {
        Duration::from_secs(self.network_secs)
    }

    pub fn extract(&self) -> Duration {
        Duration::from_secs(self.extract_secs)
    }
}

/// Registries named `local` or `*.local` only exist in the local engine cache.
pub fn is_local_registry(address: &str) -> bool {
    let host = address.split('/').next().unwrap_or(address);
    host == "local" || host.ends_with(".local")
}

impl RegistrySettings {
    pub fn is_local_only(&self) -> bool {
        self.address.as_deref().is_some_and(is_local_registry)
    }
}

impl KindSettings {
    /// Cluster name to side-load into, if side-loading is enabled.
    pub fn sideload_target(&self, requested: bool) -> Option<String> {
        if !(requested || self.always_load) {
            return None;
        }
        Some(
            self.cluster_name
                .clone()
                .unwrap_or_else(|| "kind".to_string()),
        )
    }
}

impl TernConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` to read variables.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        };
        set(&mut self.registry.address, "TERN_REGISTRY_ADDRESS");
        set(&mut self.registry.username, "TERN_REGISTRY_USERNAME");
        set(&mut self.registry.token, "TERN_REGISTRY_TOKEN");
        set(&mut self.cluster.server, "TERN_CLUSTER_SERVER");
        set(&mut self.cluster.token, "TERN_CLUSTER_TOKEN");
        set(&mut self.docker.host, "DOCKER_HOST");
    }

    /// Docker Engine base URL, translating `tcp://` to `http://`.
    pub fn docker_endpoint(&self) -> String {
        match self.docker.host.as_deref() {
            Some(host) => match host.strip_prefix("tcp://") {
                Some(rest) => format!("http://{rest}"),
                None => host.to_string(),
            },
            None => DEFAULT_DOCKER_HOST.to_string(),
        }
    }
}
