//! Content identity of a component, derived from git history.
//!
//! The identity of a scope is the id of the most recent commit that touched
//! it. It is only ever computed over a clean working tree, so two clean
//! checkouts of the same commit always agree and a commit elsewhere in the
//! repository never changes it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::git::VersionControl;

/// Length of the abbreviated hash used in labels and logs.
pub const SHORT_HASH_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentIdentity {
    pub component_name: String,
    /// Scope relative to the repository root
    pub scope_path: PathBuf,
    /// Full id of the newest commit touching `scope_path`
    pub content_hash: String,
}

impl ComponentIdentity {
    pub fn short(&self) -> &str {
        &self.content_hash[..self.content_hash.len().min(SHORT_HASH_LEN)]
    }
}

/// Content hash of `scope_path`.
///
/// Fails with [`Error::UncommittedChanges`] on a dirty tree and
/// [`Error::NoHistory`] when no reachable commit touched the scope.
pub fn derive_content_hash(vcs: &dyn VersionControl, scope_path: &Path) -> Result<String> {
    if !vcs.is_clean()? {
        return Err(Error::UncommittedChanges(vcs.root().display().to_string()));
    }
    let newest = vcs
        .log(scope_path, Some(1))?
        .into_iter()
        .next()
        .ok_or_else(|| Error::NoHistory(scope_path.display().to_string()))?;
    Ok(newest.id)
}

pub fn derive_identity(
    vcs: &dyn VersionControl,
    component_name: &str,
    scope_path: &Path,
) -> Result<ComponentIdentity> {
    let content_hash = derive_content_hash(vcs, scope_path)?;
    tracing::debug!(
        "Component '{component_name}' at '{}' has hash {content_hash}",
        scope_path.display()
    );
    Ok(ComponentIdentity {
        component_name: component_name.to_string(),
        scope_path: scope_path.to_path_buf(),
        content_hash,
    })
}
