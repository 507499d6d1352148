//! Turning a repository into a running deployment.
//!
//! [`Assembler`] derives component identities, makes sure images exist and
//! collects each component's exported definition into a
//! [`DeploymentDescriptor`]. [`Reconciler`] applies that descriptor to the
//! orchestrator and waits for the workloads to come up.

pub mod assembler;
pub mod descriptor;
pub mod naming;
pub mod readiness;
pub mod reconciler;

pub use assembler::{AssembleOptions, Assembler, EXPORT_FLAG};
pub use descriptor::{
    AppDeploymentSpec, AppDetails, ComponentDefinition, ComponentType, Dependency,
    DeploymentDescriptor, EnvVarDefinition, RouteSpec,
};
pub use naming::{deployment_name, validate_version};
pub use readiness::{POLL_INTERVAL, ReadinessWaiter};
pub use reconciler::{ReconcileOptions, Reconciler, pull_secret_name};
