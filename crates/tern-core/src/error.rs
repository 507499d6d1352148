//! Error taxonomy for tern operations.
//!
//! Every failure except validation problems is fatal to the invocation. The
//! CLI maps these to a non-zero exit with the rendered message.

use std::time::Duration;

use thiserror::Error;

use crate::release::Problem;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("uncommitted changes present in '{0}', commit or stash them first")]
    UncommittedChanges(String),

    #[error("no commit has ever touched '{0}'")]
    NoHistory(String),

    #[error(
        "invalid name '{0}': names contain only lowercase alphanumeric characters and dashes"
    )]
    InvalidName(String),

    #[error("invalid version '{0}': expected a semantic version such as v1.2.3")]
    InvalidVersion(String),

    #[error("component image '{0}' does not exist")]
    ImageNotFound(String),

    #[error("failed to build image '{image}': {message}")]
    ImageBuildFailed { image: String, message: String },

    #[error("failed to push image '{image}': {message}")]
    ImagePushFailed { image: String, message: String },

    #[error("failed to side-load image '{image}': {message}")]
    Sideload { image: String, message: String },

    #[error("failed to extract definition of component '{component}': {message}")]
    Extraction { component: String, message: String },

    #[error("no platform found: {0}")]
    PlatformNotFound(String),

    #[error("'{identifier}' matched {count} resources and no selection was made")]
    AmbiguousMatch { identifier: String, count: usize },

    #[error("no deployment matches '{0}'")]
    NoMatch(String),

    #[error("{} problem(s) would prevent release activation", .0.len())]
    ValidationProblems(Vec<Problem>),

    #[error("release aborted")]
    ReleaseAborted,

    #[error("conflicting change to {kind} '{name}': {message}")]
    ApplyConflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("{kind} '{name}' not found")]
    ResourceNotFound { kind: String, name: String },

    #[error("timed out after {timeout:?} waiting for {what} to be ready")]
    ReadinessTimeout { what: String, timeout: Duration },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("registry credentials rejected: {0}")]
    CredentialError(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("API request failed with HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("container engine request failed with HTTP {status}: {message}")]
    Engine { status: u16, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("interactive input required: {0}")]
    NotInteractive(String),

    #[error("no valid answer after {0} attempts")]
    PromptAttemptsExhausted(usize),

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ResourceNotFound { .. })
    }

    /// Map a not-found error to `None`, passing every other outcome through.
    pub fn ignore_not_found<T>(result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
