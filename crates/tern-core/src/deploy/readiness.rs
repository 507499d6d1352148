//! Polling for workload readiness.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{Orchestrator, ResourceKind, labels, selector};
use crate::deadline::{CancelSignal, Deadline};
use crate::error::{Error, Result};
use crate::platform::TargetPlatform;

use super::descriptor::ComponentDefinition;

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Platform components that must be up before app components can be.
const PLATFORM_COMPONENTS: [&str; 2] = ["nats", "broker"];

pub struct ReadinessWaiter {
    orchestrator: Arc<dyn Orchestrator>,
    poll_interval: Duration,
}

impl ReadinessWaiter {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self {
            orchestrator,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait for the platform and every listed component.
    ///
    /// A zero `timeout` returns immediately.
    pub async fn wait_platform_ready(
        &self,
        platform: &TargetPlatform,
        components: &BTreeMap<String, ComponentDefinition>,
        timeout: Duration,
        cancel: CancelSignal,
    ) -> Result<()> {
        if timeout.is_zero() {
            return Ok(());
        }
        let deadline = Deadline::after(timeout, cancel);

        tracing::info!("Waiting for platform '{}' to be ready...", platform.name);
        for component in PLATFORM_COMPONENTS {
            self.wait_pods_ready(platform, component, None, &deadline)
                .await?;
        }
        for (name, def) in components {
            tracing::info!("Waiting for component '{name}' to be ready...");
            self.wait_pods_ready(platform, name, Some(&def.hash), &deadline)
                .await?;
        }
        Ok(())
    }

    /// Poll until pods for `component` exist and all their containers are ready.
    pub async fn wait_pods_ready(
        &self,
        platform: &TargetPlatform,
        component: &str,
        hash: Option<&str>,
        deadline: &Deadline,
    ) -> Result<()> {
        let mut selector = selector([
            (labels::PLATFORM, platform.name.as_str()),
            (labels::COMPONENT, component),
        ]);
        if let Some(hash) = hash {
            selector.insert(labels::COMPONENT_HASH.to_string(), hash.to_string());
        }
        let timed_out = || Error::ReadinessTimeout {
            what: format!("component '{component}'"),
            timeout: deadline.budget(),
        };

        loop {
            let pods = deadline
                .run(self.orchestrator.list(
                    ResourceKind::Pod,
                    Some(&platform.namespace),
                    &selector,
                ))
                .await
                .map_err(|err| match err {
                    Error::Timeout(_) => timed_out(),
                    other => other,
                })?;

            if !pods.is_empty() && pods.iter().all(|p| p.pod_is_ready()) {
                tracing::debug!("Component '{component}' is ready");
                return Ok(());
            }
            if deadline.is_expired() {
                return Err(timed_out());
            }
            deadline.sleep(self.poll_interval).await?;
        }
    }
}
