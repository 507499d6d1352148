//! Orchestrator port and the resources exchanged through it.

mod kube;
mod resources;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{Error, Result};

pub use kube::KubeClient;
pub use resources::{ObjectMeta, Resource, ResourceKind, TERN_API_GROUP, TERN_API_VERSION};

/// Label keys written and queried by tern.
pub mod labels {
    pub const APP_NAME: &str = "app.tern.dev/name";
    pub const APP_COMMIT: &str = "app.tern.dev/commit";
    pub const APP_COMMIT_SHORT: &str = "app.tern.dev/commit-short";
    pub const APP_VERSION: &str = "app.tern.dev/version";
    pub const APP_TAG: &str = "app.tern.dev/tag";
    pub const APP_BRANCH: &str = "app.tern.dev/branch";

    pub const PLATFORM: &str = "app.tern.dev/platform";
    pub const COMPONENT: &str = "app.tern.dev/component";
    pub const COMPONENT_HASH: &str = "app.tern.dev/component-hash";

    pub const VIRTUAL_ENV: &str = "app.tern.dev/virtual-env";
    pub const SOURCE_RESOURCE_VERSION: &str = "app.tern.dev/source-resource-version";
}

pub type Labels = BTreeMap<String, String>;

/// Build a label selector map from pairs.
pub fn selector<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Fails with [`Error::ResourceNotFound`] when absent.
    async fn get(&self, kind: ResourceKind, namespace: Option<&str>, name: &str)
    -> Result<Resource>;

    /// `namespace: None` lists across all namespaces.
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        labels: &Labels,
    ) -> Result<Vec<Resource>>;

    async fn create(&self, resource: &Resource, dry_run: bool) -> Result<Resource>;

    /// Replace an object; `resource` must carry the observed `resourceVersion`.
    async fn update(&self, resource: &Resource, dry_run: bool) -> Result<Resource>;

    /// Create, or update carrying the current `resourceVersion`.
    async fn upsert(&self, resource: &Resource, dry_run: bool) -> Result<Resource> {
        let existing = Error::ignore_not_found(
            self.get(resource.kind, resource.namespace(), resource.name())
                .await,
        )?;
        match existing {
            None => {
                tracing::debug!("Creating {} '{}'", resource.kind, resource.key());
                self.create(resource, dry_run).await
            }
            Some(current) => {
                tracing::debug!("Updating {} '{}'", resource.kind, resource.key());
                let mut desired = resource.clone();
                desired.metadata.resource_version = current.metadata.resource_version;
                self.update(&desired, dry_run).await
            }
        }
    }
}
