//! Activating a deployment in a virtual environment.
//!
//! A release resolves a deployment, validates it against the environment's
//! variables, optionally freezes those variables in a snapshot and binds the
//! deployment to the virtual environment.

pub mod merge;
pub mod resolver;
pub mod snapshot;
pub mod validate;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};

use crate::cluster::{Labels, Orchestrator, Resource, ResourceKind};
use crate::config::DEFAULT_NETWORK_SECS;
use crate::deadline::{CancelSignal, Deadline};
use crate::deploy::{ComponentType, ReadinessWaiter};
use crate::error::{Error, Result};
use crate::platform::TargetPlatform;
use crate::prompt::{self, Prompter};

pub use merge::{MergeConflict, three_way_merge};
pub use resolver::{DeploymentResolver, INDEX_KEYS, IndexKey};
pub use snapshot::{EnvSnapshot, SnapshotSource, data_checksum, ensure_snapshot, snapshot_name};
pub use validate::{EnvData, Problem, ProblemKind, merge_env, validate, vars_of};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseOptions {
    pub virtual_env: String,
    /// Release with the data of an existing snapshot
    pub snapshot: Option<String>,
    /// Freeze the current data in a snapshot (ignored with `snapshot`)
    pub create_snapshot: bool,
    pub dry_run: bool,
    /// Zero skips the readiness wait
    pub wait_timeout: Duration,
}

/// What a virtual environment was bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBinding {
    pub virtual_env: String,
    pub deployment_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
}

impl ReleaseBinding {
    fn release_field(&self) -> Value {
        let mut app_deployment = json!({ "name": self.deployment_name });
        if let Some(version) = &self.deployment_version {
            app_deployment["version"] = json!(version);
        }
        let mut release = json!({ "appDeployment": app_deployment });
        if let Some(snapshot) = &self.snapshot_name {
            release["virtualEnvSnapshot"] = json!(snapshot);
        }
        release
    }
}

pub struct Releaser {
    orchestrator: Arc<dyn Orchestrator>,
    prompter: Arc<dyn Prompter>,
    resolver: DeploymentResolver,
    waiter: ReadinessWaiter,
    app_name: String,
    network_timeout: Duration,
    cancel: CancelSignal,
}

impl Releaser {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        prompter: Arc<dyn Prompter>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            resolver: DeploymentResolver::new(orchestrator.clone(), prompter.clone()),
            waiter: ReadinessWaiter::new(orchestrator.clone()),
            orchestrator,
            prompter,
            app_name: app_name.into(),
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

    fn deadline(&self) -> Deadline {
        Deadline::after(self.network_timeout, self.cancel.clone())
    }

    /// Release the deployment matching `identifier` into `opts.virtual_env`.
    pub async fn release(
        &self,
        identifier: &str,
        platform: &TargetPlatform,
        opts: &ReleaseOptions,
    ) -> Result<ReleaseBinding> {
        let deployment = self
            .resolver
            .resolve(&self.app_name, identifier, platform, &self.deadline())
            .await?;
        tracing::info!("Releasing deployment '{}'", deployment.name);
        let ns = platform.namespace.as_str();

        // Each phase gets its own budget; prompts in between do not count.
        let deadline = self.deadline();
        let base = deadline
            .run(
                self.orchestrator
                    .get(ResourceKind::VirtualEnv, Some(ns), &opts.virtual_env),
            )
            .await?;

        let data = match opts.snapshot.as_deref() {
            Some(name) => {
                let snapshot = deadline
                    .run(
                        self.orchestrator
                            .get(ResourceKind::VirtualEnvSnapshot, Some(ns), name),
                    )
                    .await?;
                vars_of(snapshot.fields.get("data"))
            }
            None => self.merged_vars(&base, &deadline).await?,
        };

        let adapter_ns = deployment.namespace.as_deref().unwrap_or(ns);
        let adapters = self.adapter_names(adapter_ns, &deadline).await?;
        let problems = validate(&deployment.spec, &data, &|name, kind| {
            Ok(kind == ComponentType::HttpAdapter && adapters.contains(name))
        })?;
        if !problems.is_empty() {
            if opts.dry_run {
                return Err(Error::ValidationProblems(problems));
            }
            self.prompter.say("Release problems:");
            for problem in &problems {
                self.prompter.say(&format!("  - {problem}"));
            }
            if !prompt::confirm(
                self.prompter.as_ref(),
                "Problems that would prevent release activation exist, continue?",
            )? {
                return Err(Error::ReleaseAborted);
            }
        }

        let deadline = self.deadline();
        let snapshot_name = match &opts.snapshot {
            Some(name) => Some(name.clone()),
            None if opts.create_snapshot => {
                let data = json!({ "vars": data });
                let snapshot = EnvSnapshot::of_virtual_env(&base, data)?;
                Some(ensure_snapshot(&self.orchestrator, ns, &snapshot, opts.dry_run, &deadline).await?)
            }
            None => None,
        };

        let binding = ReleaseBinding {
            virtual_env: opts.virtual_env.clone(),
            deployment_name: deployment.name.clone(),
            deployment_version: deployment.spec.version.clone(),
            snapshot_name,
        };
        self.bind(&base, &binding, opts.dry_run, &deadline).await?;

        if !opts.dry_run {
            self.waiter
                .wait_platform_ready(
                    platform,
                    &deployment.spec.components,
                    opts.wait_timeout,
                    self.cancel.clone(),
                )
                .await?;
        }
        Ok(binding)
    }

    /// Environment variables layered with the virtual environment's overrides.
    async fn merged_vars(&self, venv: &Resource, deadline: &Deadline) -> Result<EnvData> {
        let overrides = vars_of(venv.fields.get("data"));
        let environment = venv
            .fields
            .get("spec")
            .and_then(|s| s.get("environment"))
            .and_then(Value::as_str);
        let Some(environment) = environment else {
            return Ok(overrides);
        };
        let env = deadline
            .run(
                self.orchestrator
                    .get(ResourceKind::Environment, None, environment),
            )
            .await?;
        Ok(merge_env(&vars_of(env.fields.get("data")), &overrides))
    }

    async fn adapter_names(&self, namespace: &str, deadline: &Deadline) -> Result<BTreeSet<String>> {
        let adapters = deadline
            .run(
                self.orchestrator
                    .list(ResourceKind::HttpAdapter, Some(namespace), &Labels::new()),
            )
            .await?;
        Ok(adapters.iter().map(|a| a.name().to_string()).collect())
    }

    /// Merge the release into the virtual environment against a fresh read.
    async fn bind(
        &self,
        base: &Resource,
        binding: &ReleaseBinding,
        dry_run: bool,
        deadline: &Deadline,
    ) -> Result<Resource> {
        let mut desired = base.fields.clone();
        let spec = desired
            .entry("spec")
            .or_insert_with(|| json!({}));
        if !spec.is_object() {
            *spec = json!({});
        }
        spec["release"] = binding.release_field();

        let current = deadline
            .run(self.orchestrator.get(
                ResourceKind::VirtualEnv,
                base.namespace(),
                base.name(),
            ))
            .await?;

        let merged = three_way_merge(
            &Value::Object(base.fields.clone()),
            &Value::Object(current.fields.clone()),
            &Value::Object(desired),
        )
        .map_err(|conflict| Error::ApplyConflict {
            kind: ResourceKind::VirtualEnv.to_string(),
            name: base.name().to_string(),
            message: format!("'{}' was changed concurrently", conflict.path),
        })?;
        let Value::Object(fields) = merged else {
            return Err(Error::Config(format!(
                "merged VirtualEnv '{}' is not an object",
                base.key()
            )));
        };

        let updated = Resource {
            kind: ResourceKind::VirtualEnv,
            metadata: current.metadata,
            fields,
        };
        deadline
            .run(self.orchestrator.update(&updated, dry_run))
            .await
    }
}
