//! Tern Core Library
//!
//! Builds component images from a git repository, assembles them into
//! deployments on a cluster and releases deployments into virtual
//! environments.

pub mod app;
pub mod cluster;
pub mod config;
pub mod context;
pub mod deadline;
pub mod deploy;
pub mod engine;
pub mod error;
pub mod git;
pub mod identity;
pub mod image;
pub mod names;
pub mod platform;
pub mod prompt;
pub mod registry;
pub mod release;
pub mod sideload;

pub use error::{Error, Result};

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, TernConfig};
    pub use crate::context::TernContext;

    // Repository
    pub use crate::app::{AppDefinition, AppLayout, ComponentDir};
    pub use crate::git::{GitRepo, VersionControl};
    pub use crate::identity::{ComponentIdentity, derive_identity};

    // Images
    pub use crate::image::{BuildOptions, ImageBuilder, ImageRef, RegistryTarget};

    // Cluster
    pub use crate::cluster::{Orchestrator, Resource, ResourceKind};
    pub use crate::platform::{PlatformFlags, TargetPlatform};

    // Deploy and release
    pub use crate::deploy::{AssembleOptions, DeploymentDescriptor, ReconcileOptions};
    pub use crate::release::{ReleaseBinding, ReleaseOptions};

    // Interaction
    pub use crate::deadline::{CancelHandle, CancelSignal};
    pub use crate::prompt::Prompter;
}
