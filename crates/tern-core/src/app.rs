//! The application definition (`app.toml`) and the on-disk layout of an app.
//!
//! An app directory lives inside a git working tree and contains:
//!
//! ```text
//! <app>/app.toml
//! <app>/components/<component>/...
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::names;

pub const APP_FILE: &str = "app.toml";
pub const COMPONENTS_DIR: &str = "components";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Overrides the configured registry address for this app
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_registry: Option<String>,
}

impl AppDefinition {
    pub fn load(app_dir: &Path) -> anyhow::Result<Self> {
        let path = app_dir.join(APP_FILE);
        tracing::debug!("Reading app definition '{}'", path.display());
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read app definition: {}", path.display()))?;
        let app: AppDefinition = toml::from_str(&content)
            .with_context(|| format!("Failed to parse app definition: {}", path.display()))?;
        names::validate_name(&app.name)
            .with_context(|| format!("Invalid app name in {}", path.display()))?;
        Ok(app)
    }

    pub fn save(&self, app_dir: &Path) -> anyhow::Result<()> {
        let path = app_dir.join(APP_FILE);
        let content = toml::to_string_pretty(self).context("Failed to serialize app definition")?;
        std::fs::create_dir_all(app_dir)
            .with_context(|| format!("Failed to create app directory: {}", app_dir.display()))?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write app definition: {}", path.display()))?;
        Ok(())
    }
}

/// An app directory resolved against its repository root.
#[derive(Debug, Clone)]
pub struct AppLayout {
    repo_root: PathBuf,
    app_dir: PathBuf,
}

/// A component directory found under `<app>/components`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDir {
    /// Directory name as found on disk
    pub dir_name: String,
    /// Cleaned component name
    pub name: String,
    /// Path relative to the repository root
    pub repo_subpath: PathBuf,
}

impl AppLayout {
    /// Both paths are canonicalized; the app must live inside the repository.
    pub fn new(repo_root: &Path, app_dir: &Path) -> anyhow::Result<Self> {
        let repo_root = std::fs::canonicalize(repo_root)
            .with_context(|| format!("Failed to resolve repo path: {}", repo_root.display()))?;
        let app_dir = std::fs::canonicalize(app_dir)
            .with_context(|| format!("Failed to resolve app path: {}", app_dir.display()))?;
        if !app_dir.starts_with(&repo_root) {
            anyhow::bail!(
                "The app at '{}' is not part of the git repo at '{}'",
                app_dir.display(),
                repo_root.display()
            );
        }
        Ok(Self {
            repo_root,
            app_dir,
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn components_dir(&self) -> PathBuf {
        self.app_dir.join(COMPONENTS_DIR)
    }

    /// Path of a repo-absolute location relative to the repository root.
    pub fn repo_subpath(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.repo_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// `app.toml` relative to the repository root, with forward slashes.
    pub fn app_file_subpath(&self) -> String {
        to_slash(&self.repo_subpath(&self.app_dir.join(APP_FILE)))
    }

    pub fn component(&self, dir_name: &str) -> ComponentDir {
        ComponentDir {
            dir_name: dir_name.to_string(),
            name: names::clean_name(dir_name),
            repo_subpath: self.repo_subpath(&self.components_dir().join(dir_name)),
        }
    }

    /// Every subdirectory of `<app>/components`, sorted by name.
    pub fn components(&self) -> anyhow::Result<Vec<ComponentDir>> {
        let dir = self.components_dir();
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list components dir: {}", dir.display()))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            out.push(self.component(&dir_name));
        }
        out.sort_by(|a, b| a.dir_name.cmp(&b.dir_name));
        Ok(out)
    }
}

impl ComponentDir {
    pub fn repo_subpath_slash(&self) -> String {
        to_slash(&self.repo_subpath)
    }
}

pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
