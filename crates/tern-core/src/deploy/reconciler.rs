//! Applying a deployment descriptor to the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{Orchestrator, Resource, ResourceKind};
use crate::config::DEFAULT_NETWORK_SECS;
use crate::deadline::{CancelSignal, Deadline};
use crate::error::Result;
use crate::image::RegistryTarget;
use crate::platform::TargetPlatform;

use super::descriptor::DeploymentDescriptor;
use super::readiness::ReadinessWaiter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Ask the orchestrator to validate without persisting
    pub dry_run: bool,
    /// Zero skips the readiness wait
    pub wait_timeout: Duration,
}

pub struct Reconciler {
    orchestrator: Arc<dyn Orchestrator>,
    waiter: ReadinessWaiter,
    registry: RegistryTarget,
    network_timeout: Duration,
    cancel: CancelSignal,
}

pub fn pull_secret_name(app_name: &str) -> String {
    format!("{app_name}-image-pull-secret")
}

impl Reconciler {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, registry: RegistryTarget) -> Self {
        Self {
            waiter: ReadinessWaiter::new(orchestrator.clone()),
            orchestrator,
            registry,
            network_timeout: Duration::from_secs(DEFAULT_NETWORK_SECS),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_waiter(mut self, waiter: ReadinessWaiter) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn waiter(&self) -> &ReadinessWaiter {
        &self.waiter
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.network_timeout, self.cancel.clone())
    }

    /// Apply `descriptor` into the platform namespace and wait for readiness.
    ///
    /// Returns the applied resource as read back from the orchestrator.
    pub async fn reconcile(
        &self,
        descriptor: &mut DeploymentDescriptor,
        platform: &TargetPlatform,
        opts: ReconcileOptions,
    ) -> Result<Resource> {
        descriptor.namespace = Some(platform.namespace.clone());

        if let Some(token) = self.registry.token.as_deref() {
            let name = pull_secret_name(&descriptor.spec.app_name);
            let username = self
                .registry
                .engine_auth()
                .map(|a| a.username)
                .unwrap_or_default();
            let secret = Resource::image_pull_secret(
                &platform.namespace,
                &name,
                self.registry.host(),
                &username,
                token,
            );
            self.deadline()
                .run(self.orchestrator.upsert(&secret, opts.dry_run))
                .await?;
            descriptor.spec.image_pull_secret_name = Some(name);
        }

        descriptor.apply_index_labels();
        let resource = descriptor.to_resource()?;
        tracing::debug!(
            "AppDeployment: {}",
            serde_json::to_string_pretty(&resource.to_value()?)?
        );
        let applied = self
            .deadline()
            .run(self.orchestrator.upsert(&resource, opts.dry_run))
            .await?;

        if opts.dry_run {
            return Ok(applied);
        }

        self.waiter
            .wait_platform_ready(
                platform,
                &descriptor.spec.components,
                opts.wait_timeout,
                self.cancel.clone(),
            )
            .await?;

        self.deadline()
            .run(self.orchestrator.get(
                ResourceKind::AppDeployment,
                Some(&platform.namespace),
                &descriptor.name,
            ))
            .await
    }
}
