//! git2-backed [`VersionControl`] implementation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::{
    Commit, DiffOptions, ErrorCode, ObjectType, Repository, Sort, Status,
    StatusOptions,
};

use super::{CommitInfo, HeadRef, VersionControl};
use crate::error::{Error, Result};

/// A git working tree.
///
/// The repository is reopened per call so the handle stays `Send + Sync`.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Open the repository containing `path`.
    pub fn discover(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)?;
        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config(format!("'{}' is a bare repository", path.display())))?;
        let root = std::fs::canonicalize(root)?;
        tracing::debug!("Opened git repo '{}'", root.display());
        Ok(Self { root })
    }

    fn open(&self) -> Result<Repository> {
        Ok(Repository::open(&self.root)?)
    }

    fn head_commit_of<'r>(&self, repo: &'r Repository) -> Result<Commit<'r>> {
        match repo.head() {
            Ok(head) => Ok(head.peel_to_commit()?),
            Err(err) if err.code() == ErrorCode::UnbornBranch || err.code() == ErrorCode::NotFound => {
                Err(Error::NoHistory(self.root.display().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn commit_info(commit: &Commit<'_>) -> CommitInfo {
    let time = DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0).unwrap_or_default();
    CommitInfo {
        id: commit.id().to_string(),
        time,
        summary: commit.summary().unwrap_or_default().to_string(),
    }
}

fn commit_touches_path(repo: &Repository, commit: &Commit<'_>, prefix: &Path) -> Result<bool> {
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };

    let mut diff_opts = DiffOptions::new();
    diff_opts.pathspec(prefix);

    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;
    Ok(diff.deltas().len() > 0)
}

impl VersionControl for GitRepo {
    fn root(&self) -> &Path {
        &self.root
    }

    fn is_clean(&self) -> Result<bool> {
        let repo = self.open()?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;
        let dirty = statuses
            .iter()
            .filter(|entry| !entry.status().intersects(Status::IGNORED))
            .count();
        Ok(dirty == 0)
    }

    fn head_ref(&self) -> Result<HeadRef> {
        let repo = self.open()?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(err) if err.code() == ErrorCode::UnbornBranch => return Ok(HeadRef::default()),
            Err(err) => return Err(err.into()),
        };
        let branch = if head.is_branch() {
            head.name().map(str::to_string)
        } else {
            None
        };

        let head_id = head.peel_to_commit()?.id();
        let mut tag = None;
        for name in repo.tag_names(None)?.iter().flatten() {
            let full = format!("refs/tags/{name}");
            let Ok(target) = repo.revparse_single(&full) else {
                continue;
            };
            if let Ok(commit) = target.peel_to_commit()
                && commit.id() == head_id
            {
                tag = Some(full);
            }
        }

        Ok(HeadRef { branch, tag })
    }

    fn head_commit(&self) -> Result<CommitInfo> {
        let repo = self.open()?;
        let commit = self.head_commit_of(&repo)?;
        Ok(commit_info(&commit))
    }

    fn log(&self, path_prefix: &Path, limit: Option<usize>) -> Result<Vec<CommitInfo>> {
        let repo = self.open()?;
        let head = self.head_commit_of(&repo)?;

        let mut revwalk = repo.revwalk()?;
        revwalk.push(head.id())?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        for oid in revwalk {
            if out.len() >= limit {
                break;
            }
            let commit = repo.find_commit(oid?)?;
            if commit_touches_path(&repo, &commit, path_prefix)? {
                out.push(commit_info(&commit));
            }
        }
        Ok(out)
    }

    fn create_tag(&self, name: &str) -> Result<()> {
        let repo = self.open()?;
        let target = self.head_commit_of(&repo)?.into_object();
        let target = target.peel(ObjectType::Commit)?;
        repo.tag_lightweight(name, &target, false)?;
        tracing::info!("Created tag '{name}'");
        Ok(())
    }

    fn remote_url(&self) -> Option<String> {
        let repo = self.open().ok()?;
        let remote = repo.find_remote("origin").ok()?;
        remote.url().map(str::to_string)
    }
}
