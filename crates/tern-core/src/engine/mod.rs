//! Container engine port.
//!
//! Image builds, pushes and pulls plus the short-lived containers used for
//! metadata extraction all go through [`ContainerEngine`]. Log-producing calls
//! hand back a byte stream that callers decode incrementally.

mod docker;

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::Result;

pub use docker::DockerEngine;

pub type LogStream = BoxStream<'static, Result<Bytes>>;

/// Username sent when only a registry token is configured.
pub const DEFAULT_REGISTRY_USERNAME: &str = "tern";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    #[serde(rename = "serveraddress")]
    pub server_address: String,
}

impl RegistryAuth {
    pub fn new(server_address: &str, username: Option<&str>, token: &str) -> Self {
        Self {
            username: username
                .filter(|u| !u.is_empty())
                .unwrap_or(DEFAULT_REGISTRY_USERNAME)
                .to_string(),
            password: token.to_string(),
            server_address: server_address.to_string(),
        }
    }

    /// Value of the engine's `X-Registry-Auth` header.
    pub fn header_value(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Tar archive of the build context
    pub context: Vec<u8>,
    /// Recipe path inside the context
    pub dockerfile: String,
    pub tags: Vec<String>,
    pub build_args: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub no_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub cmd: Vec<String>,
    /// Allocate a TTY so logs come back unmultiplexed
    pub tty: bool,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn image_exists_locally(&self, image: &str) -> Result<bool>;

    async fn build(&self, request: BuildRequest) -> Result<LogStream>;

    async fn push(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<LogStream>;

    async fn pull(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<LogStream>;

    /// Returns the container id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Block until the container stops; returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64>;

    /// Stdout of a stopped container.
    async fn container_logs(&self, id: &str) -> Result<LogStream>;

    async fn remove_container(&self, id: &str) -> Result<()>;
}

/// Split `registry/repo:tag` into `(registry/repo, tag)`.
///
/// A colon that belongs to a registry port is not a tag separator.
pub fn split_image_tag(image: &str) -> (&str, Option<&str>) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, Some(tag)),
        _ => (image, None),
    }
}
