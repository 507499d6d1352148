//! Assembling a deployment descriptor from the repository.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::app::{AppDefinition, AppLayout};
use crate::config::{DEFAULT_EXTRACT_SECS, DEFAULT_NETWORK_SECS};
use crate::deadline::{CancelSignal, Deadline};
use crate::engine::{ContainerEngine, ContainerSpec};
use crate::error::{Error, Result};
use crate::git::VersionControl;
use crate::identity::derive_identity;
use crate::image::{BuildOptions, ImageBuilder, ImageRef};
use crate::prompt::{self, Prompter};

use super::descriptor::{AppDeploymentSpec, AppDetails, ComponentDefinition, DeploymentDescriptor};
use super::naming::{deployment_name, validate_version};

/// Argument that makes a component image print its definition and exit.
pub const EXPORT_FLAG: &str = "-export";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Explicit deployment name
    pub name: Option<String>,
    pub version: Option<String>,
    /// Tag HEAD with `version` if it is not tagged with it already
    pub create_tag: bool,
    /// Images are known to exist (e.g. just published)
    pub skip_image_check: bool,
}

pub struct Assembler {
    vcs: Arc<dyn VersionControl>,
    layout: AppLayout,
    app: AppDefinition,
    builder: ImageBuilder,
    engine: Arc<dyn ContainerEngine>,
    prompter: Arc<dyn Prompter>,
    extract_timeout: Duration,
    network_timeout: Duration,
    cancel: CancelSignal,
}

impl Assembler {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        layout: AppLayout,
        app: AppDefinition,
        builder: ImageBuilder,
        engine: Arc<dyn ContainerEngine>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            vcs,
            layout,
            app,
            builder,
            engine,
            prompter,
            extract_timeout: Duration::from_secs(DEFAULT_EXTRACT_SECS),
            network_timeout: Duration::from_secs(DEFAULT_NETWORK_SECS),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
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

    pub fn builder(&self) -> &ImageBuilder {
        &self.builder
    }

    /// Build (and with `opts.push`, publish) every component image.
    pub async fn build_all(&self, opts: BuildOptions) -> Result<Vec<ImageRef>> {
        let mut images = Vec::new();
        for component in self.layout.components().map_err(config_error)? {
            let identity =
                derive_identity(self.vcs.as_ref(), &component.name, &component.repo_subpath)?;
            images.push(
                self.builder
                    .ensure_image(&component, &identity, opts)
                    .await?,
            );
        }
        Ok(images)
    }

    /// Descriptor for the current repository state.
    pub async fn assemble(&self, opts: &AssembleOptions) -> Result<DeploymentDescriptor> {
        if let Some(version) = opts.version.as_deref() {
            validate_version(version)?;
        }

        if !self.vcs.is_clean()? {
            return Err(Error::UncommittedChanges(
                self.vcs.root().display().to_string(),
            ));
        }
        let head_commit = self.vcs.head_commit()?;
        let mut head = self.vcs.head_ref()?;

        if opts.create_tag
            && let Some(version) = opts.version.as_deref()
            && head.tag_name() != Some(version)
        {
            self.vcs.create_tag(version)?;
            head = self.vcs.head_ref()?;
        }

        let name = deployment_name(
            opts.name.as_deref(),
            &self.app.name,
            opts.version.as_deref(),
            &head,
            &head_commit.id,
        )?;

        let mut components = BTreeMap::new();
        for component in self.layout.components().map_err(config_error)? {
            let identity =
                derive_identity(self.vcs.as_ref(), &component.name, &component.repo_subpath)?;
            components.insert(
                component.name.clone(),
                ComponentDefinition::with_hash(identity.content_hash),
            );
        }

        if !opts.skip_image_check {
            self.check_images(&components).await?;
        }

        for (component, def) in components.iter_mut() {
            let image = self.image_for(component, &def.hash);
            let exported = self.extract_definition(component, &image).await?;
            def.merge_exported(exported);
        }

        Ok(DeploymentDescriptor {
            name,
            namespace: None,
            labels: BTreeMap::new(),
            spec: AppDeploymentSpec {
                app_name: self.app.name.clone(),
                version: opts.version.clone(),
                commit: head_commit.id,
                commit_time: head_commit.time,
                branch: head.branch_name().map(str::to_string),
                tag: head.tag_name().map(str::to_string),
                repo_url: self.vcs.remote_url(),
                container_registry: self.builder.target().address.clone(),
                image_pull_secret_name: None,
                components,
            },
            details: AppDetails {
                title: self.app.title.clone(),
                description: self.app.description.clone(),
            },
        })
    }

    fn image_for(&self, component: &str, hash: &str) -> ImageRef {
        ImageRef::new(
            self.builder.target().address.clone(),
            self.app.name.clone(),
            component,
            hash,
        )
    }

    async fn check_images(&self, components: &BTreeMap<String, ComponentDefinition>) -> Result<()> {
        let mut missing = Vec::new();
        for (component, def) in components {
            let image = self.image_for(component, &def.hash);
            if self.builder.image_exists(&image, false).await? {
                tracing::info!("Component image '{image}' exists");
                self.builder.sideload(&image).await?;
            } else {
                tracing::warn!("Component image '{image}' does not exist");
                missing.push(image);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        self.prompter.say(&format!(
            "{} component image(s) are missing and must be built before continuing.",
            missing.len()
        ));
        if !prompt::confirm(
            self.prompter.as_ref(),
            "Missing component images, would you like to build them?",
        )? {
            let names: Vec<String> = missing.iter().map(ImageRef::to_string).collect();
            return Err(Error::ImageNotFound(names.join(", ")));
        }
        self.build_all(BuildOptions {
            push: true,
            ..BuildOptions::default()
        })
        .await?;
        Ok(())
    }

    /// Run the image with [`EXPORT_FLAG`] and parse what it prints.
    ///
    /// The container is removed afterwards whether or not extraction worked.
    pub async fn extract_definition(
        &self,
        component: &str,
        image: &ImageRef,
    ) -> Result<ComponentDefinition> {
        let fail = |message: String| Error::Extraction {
            component: component.to_string(),
            message,
        };
        let deadline = Deadline::after(self.extract_timeout, self.cancel.clone());
        let spec = ContainerSpec {
            image: image.to_string(),
            cmd: vec![EXPORT_FLAG.to_string()],
            tty: true,
        };
        let id = deadline.run(self.engine.create_container(&spec)).await?;

        let result = deadline.run(self.run_export(component, &id)).await;

        let cleanup = Deadline::after(self.network_timeout, CancelSignal::never());
        if let Err(err) = cleanup.run(self.engine.remove_container(&id)).await {
            tracing::error!("Failed to remove component container '{id}': {err}");
        }

        let output = result?;
        serde_json::from_slice::<ComponentDefinition>(&output)
            .map_err(|err| fail(format!("invalid definition output: {err}")))
    }

    async fn run_export(&self, component: &str, id: &str) -> Result<Vec<u8>> {
        self.engine.start_container(id).await?;
        let status = self.engine.wait_container(id).await?;
        let mut logs = self.engine.container_logs(id).await?;
        let mut output = Vec::new();
        while let Some(chunk) = logs.next().await {
            output.extend_from_slice(&chunk?);
        }
        if status != 0 {
            return Err(Error::Extraction {
                component: component.to_string(),
                message: format!(
                    "container exited with status {status}: {}",
                    String::from_utf8_lossy(&output).trim()
                ),
            });
        }
        Ok(output)
    }
}

fn config_error(err: anyhow::Error) -> Error {
    Error::Config(format!("{err:#}"))
}
