//! Version control port.
//!
//! Identity derivation and deployment metadata only need a handful of
//! read operations plus commit/tag for the `--create-tag` flow. [`GitRepo`]
//! implements them with git2.

mod repo;

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;

pub use repo::GitRepo;

/// A commit as seen by tern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full hex object id
    pub id: String,
    /// Committer time
    pub time: DateTime<Utc>,
    pub summary: String,
}

impl CommitInfo {
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(7)]
    }
}

/// Symbolic refs pointing at HEAD, as full ref names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadRef {
    /// e.g. `refs/heads/main`; `None` when HEAD is detached
    pub branch: Option<String>,
    /// e.g. `refs/tags/v1.2.3` when a tag points at the HEAD commit
    pub tag: Option<String>,
}

impl HeadRef {
    pub fn branch_name(&self) -> Option<&str> {
        self.branch
            .as_deref()
            .map(|r| r.strip_prefix("refs/heads/").unwrap_or(r))
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag
            .as_deref()
            .map(|r| r.strip_prefix("refs/tags/").unwrap_or(r))
    }
}

pub trait VersionControl: Send + Sync {
    /// Working tree root.
    fn root(&self) -> &Path;

    /// True when no tracked file is modified, staged or deleted and no
    /// untracked, non-ignored file exists.
    fn is_clean(&self) -> Result<bool>;

    fn head_ref(&self) -> Result<HeadRef>;

    fn head_commit(&self) -> Result<CommitInfo>;

    /// Commits reachable from HEAD that touch `path_prefix` (relative to the
    /// root), newest first, at most `limit` of them.
    fn log(&self, path_prefix: &Path, limit: Option<usize>) -> Result<Vec<CommitInfo>>;

    /// Create a lightweight tag on HEAD.
    fn create_tag(&self, name: &str) -> Result<()>;

    /// URL of the `origin` remote, if any.
    fn remote_url(&self) -> Option<String>;
}
