//! Deployment descriptor and component definitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cluster::{Resource, ResourceKind, labels};
use crate::error::{Error, Result};
use crate::identity::SHORT_HASH_LEN;
use crate::names::label_value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentType {
    /// A component deployed as part of an app
    #[default]
    Component,
    /// An external HTTP service reached through an adapter resource
    HttpAdapter,
    /// Platform-provided component (broker, http server)
    Platform,
    #[serde(other)]
    Unknown,
}

impl ComponentType {
    pub fn is_adapter(self) -> bool {
        matches!(self, ComponentType::HttpAdapter)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarDefinition {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub var_type: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_var_schema: BTreeMap<String, EnvVarDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(default, rename = "type")]
    pub dep_type: ComponentType,
}

/// What a component declares about itself, plus its content hash.
///
/// Everything except `hash` is reported by the component image when run with
/// `-export`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    #[serde(default)]
    pub hash: String,

    #[serde(default, rename = "type")]
    pub component_type: ComponentType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteSpec>,

    #[serde(default)]
    pub default_handler: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_var_schema: BTreeMap<String, EnvVarDefinition>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Dependency>,
}

impl ComponentDefinition {
    pub fn with_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..Self::default()
        }
    }

    /// Merge an exported definition, keeping this definition's hash.
    pub fn merge_exported(&mut self, exported: ComponentDefinition) {
        let hash = std::mem::take(&mut self.hash);
        *self = exported;
        self.hash = hash;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDeploymentSpec {
    pub app_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub commit: String,

    pub commit_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, rename = "repoURL", skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,

    pub container_registry: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret_name: Option<String>,

    #[serde(default)]
    pub components: BTreeMap<String, ComponentDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentDescriptor {
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub spec: AppDeploymentSpec,
    pub details: AppDetails,
}

impl DeploymentDescriptor {
    /// Labels the release resolver searches by.
    pub fn index_labels(&self) -> BTreeMap<String, String> {
        let spec = &self.spec;
        let short = &spec.commit[..spec.commit.len().min(SHORT_HASH_LEN)];
        let mut out = BTreeMap::new();
        out.insert(labels::APP_NAME.to_string(), label_value(&spec.app_name));
        out.insert(labels::APP_COMMIT.to_string(), label_value(&spec.commit));
        out.insert(labels::APP_COMMIT_SHORT.to_string(), label_value(short));
        let optional = [
            (labels::APP_VERSION, &spec.version),
            (labels::APP_TAG, &spec.tag),
            (labels::APP_BRANCH, &spec.branch),
        ];
        for (key, value) in optional {
            if let Some(value) = value.as_deref().map(label_value).filter(|v| !v.is_empty()) {
                out.insert(key.to_string(), value);
            }
        }
        out
    }

    pub fn apply_index_labels(&mut self) {
        let index = self.index_labels();
        self.labels.extend(index);
    }

    pub fn to_resource(&self) -> Result<Resource> {
        let mut resource = Resource::app_deployment(
            self.namespace.as_deref(),
            &self.name,
            serde_json::to_value(&self.spec)?,
            serde_json::to_value(&self.details)?,
        );
        resource.metadata.labels = self.labels.clone();
        Ok(resource)
    }

    pub fn from_resource(resource: &Resource) -> Result<Self> {
        if resource.kind != ResourceKind::AppDeployment {
            return Err(Error::Config(format!(
                "expected an AppDeployment, got {}",
                resource.kind
            )));
        }
        let spec = resource
            .field::<AppDeploymentSpec>("spec")?
            .ok_or_else(|| Error::Config(format!("AppDeployment '{}' has no spec", resource.key())))?;
        Ok(Self {
            name: resource.name().to_string(),
            namespace: resource.namespace().map(str::to_string),
            labels: resource.metadata.labels.clone(),
            spec,
            details: resource.field("details")?.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DeploymentDescriptor {
        DeploymentDescriptor {
            name: "shop-main".into(),
            namespace: Some("tern-dev".into()),
            labels: BTreeMap::new(),
            spec: AppDeploymentSpec {
                app_name: "shop".into(),
                version: Some("v1.2.3".into()),
                commit: "abc123f0000000000000000000000000000000ff".into(),
                commit_time: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
                branch: Some("feature/login".into()),
                tag: None,
                repo_url: None,
                container_registry: "ghcr.io/acme".into(),
                image_pull_secret_name: None,
                components: BTreeMap::from([(
                    "backend".to_string(),
                    ComponentDefinition::with_hash("abc123f"),
                )]),
            },
            details: AppDetails::default(),
        }
    }

    #[test]
    fn index_labels_are_cleaned() {
        let labels = descriptor().index_labels();
        assert_eq!(labels[labels::APP_COMMIT_SHORT], "abc123f");
        assert_eq!(labels[labels::APP_BRANCH], "feature-login");
        assert_eq!(labels[labels::APP_VERSION], "v1.2.3");
        assert!(!labels.contains_key(labels::APP_TAG));
    }

    #[test]
    fn resource_conversion_keeps_spec() {
        let mut original = descriptor();
        original.apply_index_labels();
        let resource = original.to_resource().unwrap();
        let value = resource.to_value().unwrap();
        assert_eq!(value["spec"]["appName"], "shop");
        assert_eq!(value["spec"]["components"]["backend"]["hash"], "abc123f");

        let parsed = DeploymentDescriptor::from_resource(&resource).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn merge_exported_keeps_hash() {
        let mut def = ComponentDefinition::with_hash("abc123f");
        let exported: ComponentDefinition = serde_json::from_str(
            r#"{"hash":"ignored","type":"component","defaultHandler":true,
                "envVarSchema":{"DB_URL":{"required":true}},
                "dependencies":{"payments":{"type":"http-adapter"}}}"#,
        )
        .unwrap();
        def.merge_exported(exported);
        assert_eq!(def.hash, "abc123f");
        assert!(def.default_handler);
        assert!(def.env_var_schema["DB_URL"].required);
        assert_eq!(def.dependencies["payments"].dep_type, ComponentType::HttpAdapter);
    }
}
