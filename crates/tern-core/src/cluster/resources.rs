//! The closed set of orchestrator resources tern reads and writes.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

pub const TERN_API_GROUP: &str = "tern.dev";
pub const TERN_API_VERSION: &str = "tern.dev/v1alpha1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Secret,
    Pod,
    Platform,
    AppDeployment,
    Environment,
    VirtualEnv,
    VirtualEnvSnapshot,
    HttpAdapter,
}

impl ResourceKind {
    pub fn kind(self) -> &'static str {
        match self {
            ResourceKind::Secret => "Secret",
            ResourceKind::Pod => "Pod",
            ResourceKind::Platform => "Platform",
            ResourceKind::AppDeployment => "AppDeployment",
            ResourceKind::Environment => "Environment",
            ResourceKind::VirtualEnv => "VirtualEnv",
            ResourceKind::VirtualEnvSnapshot => "VirtualEnvSnapshot",
            ResourceKind::HttpAdapter => "HTTPAdapter",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            ResourceKind::Secret => "secrets",
            ResourceKind::Pod => "pods",
            ResourceKind::Platform => "platforms",
            ResourceKind::AppDeployment => "appdeployments",
            ResourceKind::Environment => "environments",
            ResourceKind::VirtualEnv => "virtualenvs",
            ResourceKind::VirtualEnvSnapshot => "virtualenvsnapshots",
            ResourceKind::HttpAdapter => "httpadapters",
        }
    }

    pub fn api_version(self) -> &'static str {
        match self {
            ResourceKind::Secret | ResourceKind::Pod => "v1",
            _ => TERN_API_VERSION,
        }
    }

    pub fn is_namespaced(self) -> bool {
        self != ResourceKind::Environment
    }

    fn api_prefix(self) -> String {
        match self.api_version() {
            "v1" => "/api/v1".to_string(),
            group_version => format!("/apis/{group_version}"),
        }
    }

    /// Collection path; `None` namespace lists across all namespaces.
    pub fn collection_path(self, namespace: Option<&str>) -> String {
        match namespace.filter(|_| self.is_namespaced()) {
            Some(ns) => format!("{}/namespaces/{ns}/{}", self.api_prefix(), self.plural()),
            None => format!("{}/{}", self.api_prefix(), self.plural()),
        }
    }

    pub fn item_path(self, namespace: Option<&str>, name: &str) -> String {
        format!("{}/{name}", self.collection_path(namespace))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

/// One orchestrator object: its kind, metadata and remaining top-level fields
/// (`spec`, `data`, `status`, `type`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub metadata: ObjectMeta,
    pub fields: Map<String, Value>,
}

impl Resource {
    pub fn new(kind: ResourceKind, namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            kind,
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace
                    .filter(|_| kind.is_namespaced())
                    .map(str::to_string),
                ..ObjectMeta::default()
            },
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn with_label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.to_string(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// `namespace/name`, or just the name for cluster-scoped objects.
    pub fn key(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{ns}/{}", self.name()),
            None => self.name().to_string(),
        }
    }

    /// Deserialize a top-level field such as `spec`.
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.fields
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(Error::from)
    }

    pub fn to_value(&self) -> Result<Value> {
        let mut object = Map::new();
        object.insert("apiVersion".into(), json!(self.kind.api_version()));
        object.insert("kind".into(), json!(self.kind.kind()));
        object.insert("metadata".into(), serde_json::to_value(&self.metadata)?);
        for (k, v) in &self.fields {
            object.insert(k.clone(), v.clone());
        }
        Ok(Value::Object(object))
    }

    /// Parse an object of a known kind (list items carry no `kind`).
    pub fn from_value(kind: ResourceKind, value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(Error::Config(format!("{kind} is not a JSON object")));
        };
        let metadata = match object.remove("metadata") {
            Some(meta) => serde_json::from_value(meta)?,
            None => ObjectMeta::default(),
        };
        object.remove("apiVersion");
        object.remove("kind");
        Ok(Self {
            kind,
            metadata,
            fields: object,
        })
    }

    // Typed constructors.

    pub fn platform(namespace: &str, name: &str) -> Self {
        Resource::new(ResourceKind::Platform, Some(namespace), name).with_field("spec", json!({}))
    }

    /// Image pull secret holding a `.dockerconfigjson` for one registry.
    pub fn image_pull_secret(
        namespace: &str,
        name: &str,
        registry: &str,
        username: &str,
        token: &str,
    ) -> Self {
        let docker_config = json!({
            "auths": {
                registry: { "username": username, "password": token }
            }
        });
        Resource::new(ResourceKind::Secret, Some(namespace), name)
            .with_field("type", json!("kubernetes.io/dockerconfigjson"))
            .with_field(
                "stringData",
                json!({ ".dockerconfigjson": docker_config.to_string() }),
            )
    }

    pub fn app_deployment(namespace: Option<&str>, name: &str, spec: Value, details: Value) -> Self {
        Resource::new(ResourceKind::AppDeployment, namespace, name)
            .with_field("spec", spec)
            .with_field("details", details)
    }

    pub fn environment(name: &str, vars: Value) -> Self {
        Resource::new(ResourceKind::Environment, None, name)
            .with_field("data", json!({ "vars": vars }))
    }

    pub fn virtual_env(namespace: &str, name: &str, environment: &str, vars: Value) -> Self {
        Resource::new(ResourceKind::VirtualEnv, Some(namespace), name)
            .with_field("spec", json!({ "environment": environment }))
            .with_field("data", json!({ "vars": vars }))
    }

    pub fn virtual_env_snapshot(namespace: &str, name: &str, source: Value, data: Value) -> Self {
        Resource::new(ResourceKind::VirtualEnvSnapshot, Some(namespace), name)
            .with_field("spec", json!({ "source": source }))
            .with_field("data", data)
    }

    pub fn http_adapter(namespace: &str, name: &str, url: &str) -> Self {
        Resource::new(ResourceKind::HttpAdapter, Some(namespace), name)
            .with_field("spec", json!({ "url": url }))
    }

    pub fn pod(namespace: &str, name: &str, ready: &[bool]) -> Self {
        let statuses: Vec<Value> = ready.iter().map(|r| json!({ "ready": r })).collect();
        Resource::new(ResourceKind::Pod, Some(namespace), name)
            .with_field("status", json!({ "containerStatuses": statuses }))
    }

    /// True when a pod has container statuses and every one reports ready.
    pub fn pod_is_ready(&self) -> bool {
        self.fields
            .get("status")
            .and_then(|s| s.get("containerStatuses"))
            .and_then(Value::as_array)
            .is_some_and(|statuses| {
                !statuses.is_empty()
                    && statuses
                        .iter()
                        .all(|c| c.get("ready").and_then(Value::as_bool).unwrap_or(false))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_api_groups() {
        assert_eq!(
            ResourceKind::Secret.item_path(Some("kf"), "pull"),
            "/api/v1/namespaces/kf/secrets/pull"
        );
        assert_eq!(
            ResourceKind::AppDeployment.collection_path(None),
            "/apis/tern.dev/v1alpha1/appdeployments"
        );
        assert_eq!(
            ResourceKind::Environment.item_path(Some("ignored"), "prod"),
            "/apis/tern.dev/v1alpha1/environments/prod"
        );
    }

    #[test]
    fn value_conversion_keeps_fields() {
        let secret = Resource::image_pull_secret("kf", "shop-image-pull-secret", "ghcr.io", "u", "t");
        let value = secret.to_value().unwrap();
        assert_eq!(value["kind"], "Secret");
        assert_eq!(value["type"], "kubernetes.io/dockerconfigjson");

        let parsed = Resource::from_value(ResourceKind::Secret, value).unwrap();
        assert_eq!(parsed, secret);
    }

    #[test]
    fn pod_readiness_needs_every_container() {
        assert!(Resource::pod("kf", "a", &[true, true]).pod_is_ready());
        assert!(!Resource::pod("kf", "a", &[true, false]).pod_is_ready());
        assert!(!Resource::new(ResourceKind::Pod, Some("kf"), "a").pod_is_ready());
        assert!(!Resource::pod("kf", "a", &[]).pod_is_ready());
    }
}
