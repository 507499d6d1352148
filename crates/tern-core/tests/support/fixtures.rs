//! Cluster objects used across release and readiness tests.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Value, json};

use tern_core::cluster::{Resource, labels};
use tern_core::deploy::{
    AppDeploymentSpec, AppDetails, ComponentDefinition, DeploymentDescriptor, EnvVarDefinition,
};
use tern_core::platform::TargetPlatform;

pub fn platform() -> TargetPlatform {
    TargetPlatform {
        namespace: "kf".to_string(),
        name: "dev".to_string(),
    }
}

pub fn descriptor(
    namespace: &str,
    name: &str,
    version: Option<&str>,
    commit: &str,
    components: BTreeMap<String, ComponentDefinition>,
) -> DeploymentDescriptor {
    let mut descriptor = DeploymentDescriptor {
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        labels: BTreeMap::new(),
        spec: AppDeploymentSpec {
            app_name: "shop".to_string(),
            version: version.map(str::to_string),
            commit: commit.to_string(),
            commit_time: Utc::now(),
            branch: Some("main".to_string()),
            tag: version.map(str::to_string),
            repo_url: None,
            container_registry: "ghcr.io/acme".to_string(),
            image_pull_secret_name: None,
            components,
        },
        details: AppDetails::default(),
    };
    descriptor.apply_index_labels();
    descriptor
}

/// An AppDeployment resource for app `shop` with a single `api` component.
pub fn deployment(namespace: &str, name: &str, version: Option<&str>, commit: &str) -> Resource {
    let components = BTreeMap::from([("api".to_string(), ComponentDefinition::with_hash(commit))]);
    descriptor(namespace, name, version, commit, components)
        .to_resource()
        .unwrap()
}

/// A component requiring `vars` and depending on `adapters`.
pub fn component(hash: &str, vars: &[&str], adapters: &[&str]) -> ComponentDefinition {
    let mut def: ComponentDefinition = serde_json::from_value(json!({
        "hash": hash,
        "dependencies": adapters
            .iter()
            .map(|a| (a.to_string(), json!({"type": "http-adapter"})))
            .collect::<serde_json::Map<String, Value>>(),
    }))
    .unwrap();
    for var in vars {
        def.env_var_schema.insert(
            var.to_string(),
            EnvVarDefinition {
                var_type: Some("string".to_string()),
                required: true,
            },
        );
    }
    def
}

pub fn pod(namespace: &str, name: &str, component: &str, hash: Option<&str>, ready: bool) -> Resource {
    let mut pod = Resource::pod(namespace, name, &[ready])
        .with_label(labels::PLATFORM, "dev")
        .with_label(labels::COMPONENT, component);
    if let Some(hash) = hash {
        pod = pod.with_label(labels::COMPONENT_HASH, hash);
    }
    pod
}
