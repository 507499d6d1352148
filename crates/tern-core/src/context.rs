//! Invocation context for dependency injection.
//!
//! The CLI builds one [`TernContext`] per run and asks it for the services a
//! command needs. Tests swap adapters with the `with_*` methods.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::app::{AppDefinition, AppLayout};
use crate::cluster::{KubeClient, Orchestrator};
use crate::config::{ConfigStore, TernConfig};
use crate::deadline::{CancelSignal, Deadline};
use crate::deploy::{Assembler, Reconciler};
use crate::engine::{ContainerEngine, DockerEngine};
use crate::error::{Error, Result};
use crate::git::{GitRepo, VersionControl};
use crate::image::{ImageBuilder, RegistryTarget};
use crate::platform::{PlatformFlags, PlatformResolver, TargetPlatform};
use crate::prompt::{NonInteractive, Prompter};
use crate::registry::{ManifestLookup, RegistryClient};
use crate::release::Releaser;
use crate::sideload::KindSideloader;

/// Unified invocation context.
///
/// Holds the loaded configuration, the app being operated on and the
/// adapters for git, the container engine, the registry and the cluster.
pub struct TernContext {
    config: TernConfig,
    store: Option<ConfigStore>,
    layout: AppLayout,
    app: AppDefinition,
    vcs: Arc<dyn VersionControl>,
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<dyn ManifestLookup>,
    orchestrator: Option<Arc<dyn Orchestrator>>,
    prompter: Arc<dyn Prompter>,
    cancel: CancelSignal,
}

impl TernContext {
    /// Open the app in `app_dir` with the real adapters.
    pub fn open(app_dir: &Path, config: TernConfig) -> anyhow::Result<Self> {
        let repo = GitRepo::discover(app_dir)
            .with_context(|| format!("Failed to open git repo for {}", app_dir.display()))?;
        let layout = AppLayout::new(repo.root(), app_dir)?;
        let app = AppDefinition::load(layout.app_dir())?;

        let engine = DockerEngine::new(&config.docker_endpoint())
            .context("Failed to create container engine client")?;
        let registry = RegistryClient::for_settings(&config.registry)
            .context("Failed to create registry client")?;
        let orchestrator = match config.cluster.server.as_deref() {
            Some(server) => {
                let client = KubeClient::new(
                    server,
                    config.cluster.token.clone(),
                    config.cluster.insecure,
                )
                .context("Failed to create cluster client")?;
                Some(Arc::new(client) as Arc<dyn Orchestrator>)
            }
            None => None,
        };

        let mut ctx = Self::from_parts(
            config,
            layout,
            app,
            Arc::new(repo),
            Arc::new(engine),
            Arc::new(registry),
        );
        ctx.orchestrator = orchestrator;
        Ok(ctx)
    }

    /// Create a context from explicit adapters, without a cluster.
    pub fn from_parts(
        config: TernConfig,
        layout: AppLayout,
        app: AppDefinition,
        vcs: Arc<dyn VersionControl>,
        engine: Arc<dyn ContainerEngine>,
        registry: Arc<dyn ManifestLookup>,
    ) -> Self {
        Self {
            config,
            store: None,
            layout,
            app,
            vcs,
            engine,
            registry,
            orchestrator: None,
            prompter: Arc::new(NonInteractive),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<dyn Orchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &TernConfig {
        &self.config
    }

    pub fn app(&self) -> &AppDefinition {
        &self.app
    }

    pub fn layout(&self) -> &AppLayout {
        &self.layout
    }

    pub fn prompter(&self) -> Arc<dyn Prompter> {
        self.prompter.clone()
    }

    pub fn orchestrator(&self) -> Result<Arc<dyn Orchestrator>> {
        self.orchestrator.clone().ok_or_else(|| {
            Error::Config(
                "no cluster configured, set cluster.server or TERN_CLUSTER_SERVER".to_string(),
            )
        })
    }

    pub fn registry_target(&self) -> Result<RegistryTarget> {
        RegistryTarget::resolve(&self.config.registry, &self.app)
    }

    /// Image builder; `kind` requests side-loading into a kind cluster.
    pub fn image_builder(&self, kind: bool) -> Result<ImageBuilder> {
        let mut builder = ImageBuilder::new(
            self.engine.clone(),
            self.registry.clone(),
            self.vcs.clone(),
            self.layout.clone(),
            self.app.name.clone(),
            self.registry_target()?,
        )
        .with_network_timeout(self.config.timeouts.network())
        .with_cancel_signal(self.cancel.clone());
        if let Some(cluster) = self.config.kind.sideload_target(kind) {
            builder = builder.with_sideloader(Arc::new(KindSideloader::new(cluster)));
        }
        Ok(builder)
    }

    pub fn assembler(&self, kind: bool) -> Result<Assembler> {
        Ok(Assembler::new(
            self.vcs.clone(),
            self.layout.clone(),
            self.app.clone(),
            self.image_builder(kind)?,
            self.engine.clone(),
            self.prompter.clone(),
        )
        .with_extract_timeout(self.config.timeouts.extract())
        .with_network_timeout(self.config.timeouts.network())
        .with_cancel_signal(self.cancel.clone()))
    }

    pub fn reconciler(&self) -> Result<Reconciler> {
        Ok(Reconciler::new(self.orchestrator()?, self.registry_target()?)
            .with_network_timeout(self.config.timeouts.network())
            .with_cancel_signal(self.cancel.clone()))
    }

    pub fn releaser(&self) -> Result<Releaser> {
        Ok(
            Releaser::new(self.orchestrator()?, self.prompter.clone(), self.app.name.clone())
                .with_network_timeout(self.config.timeouts.network())
                .with_cancel_signal(self.cancel.clone()),
        )
    }

    /// Resolve the target platform, storing it in config when asked to.
    pub async fn resolve_platform(&self, flags: &PlatformFlags) -> Result<TargetPlatform> {
        let resolver = PlatformResolver::new(self.orchestrator()?, self.prompter.clone());
        let deadline = Deadline::after(self.config.timeouts.network(), self.cancel.clone());
        let resolved = resolver
            .resolve(flags, &self.config.cluster, &deadline)
            .await?;

        if resolved.remember
            && let Some(store) = &self.store
        {
            let platform = resolved.platform.clone();
            store
                .update(|config| {
                    config.cluster.namespace = Some(platform.namespace);
                    config.cluster.platform = Some(platform.name);
                })
                .map_err(|err| Error::Config(format!("{err:#}")))?;
            tracing::info!("Stored platform in {}", store.config_path().display());
        }
        Ok(resolved.platform)
    }
}
