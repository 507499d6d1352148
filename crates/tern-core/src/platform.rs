//! Target platform resolution.
//!
//! Order: explicit flags, then the remembered platform from config, then the
//! platforms found on the cluster (picked interactively when there are
//! several).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cluster::{Labels, Orchestrator, Resource, ResourceKind};
use crate::config::ClusterSettings;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::prompt::{self, Prompter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPlatform {
    pub namespace: String,
    pub name: String,
}

impl TargetPlatform {
    fn from_resource(resource: &Resource) -> Self {
        Self {
            namespace: resource.namespace().unwrap_or_default().to_string(),
            name: resource.name().to_string(),
        }
    }
}

/// Platform named on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformFlags {
    pub namespace: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlatform {
    pub platform: TargetPlatform,
    /// The operator asked to store this choice in config
    pub remember: bool,
}

pub struct PlatformResolver {
    orchestrator: Arc<dyn Orchestrator>,
    prompter: Arc<dyn Prompter>,
}

impl PlatformResolver {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            orchestrator,
            prompter,
        }
    }

    pub async fn resolve(
        &self,
        flags: &PlatformFlags,
        stored: &ClusterSettings,
        deadline: &Deadline,
    ) -> Result<ResolvedPlatform> {
        let (namespace, name) = match &flags.name {
            Some(name) => (flags.namespace.clone(), Some(name.clone())),
            None => (stored.namespace.clone(), stored.platform.clone()),
        };

        if let Some(name) = name {
            let found = match namespace.as_deref() {
                Some(ns) => Error::ignore_not_found(
                    deadline
                        .run(self.orchestrator.get(ResourceKind::Platform, Some(ns), &name))
                        .await,
                )?,
                None => self
                    .list(deadline)
                    .await?
                    .into_iter()
                    .find(|p| p.name() == name),
            };
            if let Some(platform) = found {
                return Ok(ResolvedPlatform {
                    platform: TargetPlatform::from_resource(&platform),
                    remember: false,
                });
            }
            tracing::warn!("Platform '{name}' not found, looking for others");
        }

        self.pick(deadline).await
    }

    async fn list(&self, deadline: &Deadline) -> Result<Vec<Resource>> {
        deadline
            .run(
                self.orchestrator
                    .list(ResourceKind::Platform, None, &Labels::new()),
            )
            .await
    }

    async fn pick(&self, deadline: &Deadline) -> Result<ResolvedPlatform> {
        let platforms = self.list(deadline).await?;
        match platforms.as_slice() {
            [] => Err(Error::PlatformNotFound(
                "no platforms exist on the cluster, create one before deploying".to_string(),
            )),
            [only] => Ok(ResolvedPlatform {
                platform: TargetPlatform::from_resource(only),
                remember: false,
            }),
            many => {
                let items: Vec<String> = many.iter().map(Resource::key).collect();
                let choice = prompt::pick(
                    self.prompter.as_ref(),
                    &format!("Found {} platforms:", many.len()),
                    &items,
                )?
                .ok_or_else(|| Error::AmbiguousMatch {
                    identifier: "platform".to_string(),
                    count: many.len(),
                })?;
                let remember = prompt::confirm(self.prompter.as_ref(), "Remember selected platform?")?;
                Ok(ResolvedPlatform {
                    platform: TargetPlatform::from_resource(&many[choice]),
                    remember,
                })
            }
        }
    }
}
