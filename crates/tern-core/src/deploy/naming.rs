//! Deployment names and version strings.

use crate::error::{Error, Result};
use crate::git::HeadRef;
use crate::names::{clean_name, validate_name};

/// Accepts `1.2.3` and `v1.2.3` (any semver, including pre-release/build).
pub fn validate_version(version: &str) -> Result<()> {
    let bare = version.strip_prefix('v').unwrap_or(version);
    semver::Version::parse(bare)
        .map(|_| ())
        .map_err(|_| Error::InvalidVersion(version.to_string()))
}

/// Pick the deployment name.
///
/// An explicit name is used as given (and must be valid); otherwise the app
/// name is suffixed with the version, the branch, the tag or the commit, in
/// that order of preference.
pub fn deployment_name(
    explicit: Option<&str>,
    app_name: &str,
    version: Option<&str>,
    head: &HeadRef,
    commit: &str,
) -> Result<String> {
    if let Some(name) = explicit {
        validate_name(name)?;
        return Ok(name.to_string());
    }
    let suffix = version
        .or(head.branch_name())
        .or(head.tag_name())
        .unwrap_or(commit);
    let name = clean_name(&format!("{app_name}-{}", clean_name(suffix)));
    validate_name(&name)?;
    Ok(name)
}
