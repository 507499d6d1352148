//! Finding the deployment a release refers to.
//!
//! An identifier is first tried as a deployment name in the platform
//! namespace, then against each index label in [`INDEX_KEYS`] order.

use std::sync::Arc;

use crate::cluster::{Labels, Orchestrator, Resource, ResourceKind, labels};
use crate::deadline::Deadline;
use crate::deploy::{DeploymentDescriptor, validate_version};
use crate::error::{Error, Result};
use crate::identity::SHORT_HASH_LEN;
use crate::names::{is_valid_name, label_value};
use crate::platform::TargetPlatform;
use crate::prompt::{self, Prompter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKey {
    Commit,
    CommitShort,
    Version,
    Tag,
    Branch,
}

/// Search order for label lookups.
pub const INDEX_KEYS: [IndexKey; 5] = [
    IndexKey::Commit,
    IndexKey::CommitShort,
    IndexKey::Version,
    IndexKey::Tag,
    IndexKey::Branch,
];

impl IndexKey {
    pub fn label(self) -> &'static str {
        match self {
            IndexKey::Commit => labels::APP_COMMIT,
            IndexKey::CommitShort => labels::APP_COMMIT_SHORT,
            IndexKey::Version => labels::APP_VERSION,
            IndexKey::Tag => labels::APP_TAG,
            IndexKey::Branch => labels::APP_BRANCH,
        }
    }

    /// Label value to search for, or `None` if `identifier` cannot be one.
    pub fn matcher(self, identifier: &str) -> Option<String> {
        let is_hex = |len: usize| {
            identifier.len() == len && identifier.chars().all(|c| c.is_ascii_hexdigit())
        };
        match self {
            IndexKey::Commit => is_hex(40).then(|| identifier.to_ascii_lowercase()),
            IndexKey::CommitShort => is_hex(SHORT_HASH_LEN).then(|| identifier.to_ascii_lowercase()),
            IndexKey::Version => validate_version(identifier)
                .ok()
                .map(|()| label_value(identifier)),
            IndexKey::Tag | IndexKey::Branch => {
                Some(label_value(identifier)).filter(|v| !v.is_empty())
            }
        }
    }
}

pub struct DeploymentResolver {
    orchestrator: Arc<dyn Orchestrator>,
    prompter: Arc<dyn Prompter>,
}

impl DeploymentResolver {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            orchestrator,
            prompter,
        }
    }

    pub async fn resolve(
        &self,
        app_name: &str,
        identifier: &str,
        platform: &TargetPlatform,
        deadline: &Deadline,
    ) -> Result<DeploymentDescriptor> {
        if is_valid_name(identifier) {
            let by_name = Error::ignore_not_found(
                deadline
                    .run(self.orchestrator.get(
                        ResourceKind::AppDeployment,
                        Some(&platform.namespace),
                        identifier,
                    ))
                    .await,
            )?;
            if let Some(found) = by_name {
                tracing::debug!("Found deployment '{}' by name", found.key());
                return DeploymentDescriptor::from_resource(&found);
            }
        }

        let app = label_value(app_name);
        for key in INDEX_KEYS {
            let Some(value) = key.matcher(identifier) else {
                continue;
            };
            let mut selector = Labels::new();
            selector.insert(labels::APP_NAME.to_string(), app.clone());
            selector.insert(key.label().to_string(), value);

            let found = deadline
                .run(
                    self.orchestrator
                        .list(ResourceKind::AppDeployment, None, &selector),
                )
                .await?;
            match found.as_slice() {
                [] => continue,
                [only] => return DeploymentDescriptor::from_resource(only),
                many => return self.choose(identifier, many),
            }
        }

        Err(Error::NoMatch(identifier.to_string()))
    }

    fn choose(&self, identifier: &str, matches: &[Resource]) -> Result<DeploymentDescriptor> {
        let items: Vec<String> = matches.iter().map(Resource::key).collect();
        let choice = prompt::pick(
            self.prompter.as_ref(),
            &format!("Found {} deployments matching '{identifier}':", matches.len()),
            &items,
        )?
        .ok_or_else(|| Error::AmbiguousMatch {
            identifier: identifier.to_string(),
            count: matches.len(),
        })?;
        DeploymentDescriptor::from_resource(&matches[choice])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matchers_reject_impossible_values() {
        assert_eq!(IndexKey::Commit.matcher("v1.2.3"), None);
        assert_eq!(IndexKey::CommitShort.matcher("ABC123F"), Some("abc123f".into()));
        assert_eq!(IndexKey::Version.matcher("main"), None);
        assert_eq!(IndexKey::Version.matcher("v1.2.3"), Some("v1.2.3".into()));
        assert_eq!(IndexKey::Branch.matcher("feature/login"), Some("feature-login".into()));
    }
}
