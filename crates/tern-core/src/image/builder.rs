//! Build-if-missing pipeline for component images.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::context::{INJECTED_RECIPE, build_context};
use super::{ImageRef, log};
use crate::app::{AppDefinition, AppLayout, ComponentDir};
use crate::config::{DEFAULT_NETWORK_SECS, RegistrySettings, is_local_registry};
use crate::deadline::{CancelSignal, Deadline};
use crate::engine::{BuildRequest, ContainerEngine, RegistryAuth};
use crate::error::{Error, Result};
use crate::git::VersionControl;
use crate::identity::ComponentIdentity;
use crate::registry::{ManifestLookup, RegistryCredentials};
use crate::sideload::Sideloader;

const DEFAULT_RECIPE: &str = include_str!("../../assets/Dockerfile");

pub const LABEL_OCI_CREATED: &str = "org.opencontainers.image.created";
pub const LABEL_OCI_REVISION: &str = "org.opencontainers.image.revision";
pub const LABEL_OCI_SOURCE: &str = "org.opencontainers.image.source";
pub const LABEL_COMPONENT: &str = "app.tern.dev/component";

/// Where component images are published, with the credentials to do so.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryTarget {
    pub address: String,
    pub username: Option<String>,
    pub token: Option<String>,
}

impl RegistryTarget {
    /// The app's own registry wins over the configured one.
    pub fn resolve(settings: &RegistrySettings, app: &AppDefinition) -> Result<Self> {
        let address = app
            .container_registry
            .clone()
            .or_else(|| settings.address.clone())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "no container registry configured, set registry.address or TERN_REGISTRY_ADDRESS"
                        .to_string(),
                )
            })?;
        Ok(Self {
            address: address.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            token: settings.token.clone().filter(|t| !t.is_empty()),
        })
    }

    pub fn is_local_only(&self) -> bool {
        is_local_registry(&self.address)
    }

    pub fn host(&self) -> &str {
        self.address.split('/').next().unwrap_or(&self.address)
    }

    pub fn engine_auth(&self) -> Option<RegistryAuth> {
        self.token
            .as_deref()
            .map(|token| RegistryAuth::new(self.host(), self.username.as_deref(), token))
    }

    pub fn credentials(&self) -> Option<RegistryCredentials> {
        self.engine_auth().map(|auth| RegistryCredentials {
            username: auth.username,
            password: auth.password,
        })
    }
}

/// Flags controlling [`ImageBuilder::ensure_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Build even when the image exists
    pub force: bool,
    /// Build without the engine cache; implies a rebuild
    pub no_cache: bool,
    /// Push after building (never for local-only registries)
    pub push: bool,
    /// Side-load into the local cluster when a side-loader is configured
    pub sideload: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            force: false,
            no_cache: false,
            push: false,
            sideload: true,
        }
    }
}

pub struct ImageBuilder {
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<dyn ManifestLookup>,
    vcs: Arc<dyn VersionControl>,
    layout: AppLayout,
    app_name: String,
    target: RegistryTarget,
    sideloader: Option<Arc<dyn Sideloader>>,
    network_timeout: Duration,
    cancel: CancelSignal,
}

impl ImageBuilder {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        registry: Arc<dyn ManifestLookup>,
        vcs: Arc<dyn VersionControl>,
        layout: AppLayout,
        app_name: impl Into<String>,
        target: RegistryTarget,
    ) -> Self {
        Self {
            engine,
            registry,
            vcs,
            layout,
            app_name: app_name.into(),
            target,
            sideloader: None,
            network_timeout: Duration::from_secs(DEFAULT_NETWORK_SECS),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_sideloader(mut self, sideloader: Arc<dyn Sideloader>) -> Self {
        self.sideloader = Some(sideloader);
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

    pub fn target(&self) -> &RegistryTarget {
        &self.target
    }

    pub fn has_sideloader(&self) -> bool {
        self.sideloader.is_some()
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.network_timeout, self.cancel.clone())
    }

    pub fn image_ref(&self, identity: &ComponentIdentity) -> ImageRef {
        ImageRef::new(
            self.target.address.clone(),
            self.app_name.clone(),
            identity.component_name.clone(),
            identity.content_hash.clone(),
        )
    }

    /// Whether `image` exists where deployments will pull it from.
    ///
    /// Local-only registries consult the engine cache; otherwise the remote
    /// manifest is checked. With `pull`, a remote image is also brought into
    /// the local cache.
    pub async fn image_exists(&self, image: &ImageRef, pull: bool) -> Result<bool> {
        let name = image.to_string();
        let deadline = self.deadline();

        if self.target.is_local_only() {
            let found = deadline
                .run(self.engine.image_exists_locally(&name))
                .await?;
            if !found && pull {
                return Err(Error::ImageNotFound(format!(
                    "{name} (not in the local cache and no remote registry available)"
                )));
            }
            return Ok(found);
        }

        let credentials = self.target.credentials();
        let found = deadline
            .run(self.registry.manifest_exists(&name, credentials.as_ref()))
            .await?;
        if !found || !pull {
            return Ok(found);
        }

        let local = deadline
            .run(self.engine.image_exists_locally(&name))
            .await?;
        if !local {
            tracing::info!("Pulling component image '{name}'");
            let auth = self.target.engine_auth();
            let failure = deadline
                .run(async {
                    let stream = self.engine.pull(&name, auth.as_ref()).await?;
                    log::drain(stream).await
                })
                .await?;
            if let Some(message) = failure {
                return Err(Error::ImageNotFound(format!("{name}: {message}")));
            }
        }
        Ok(true)
    }

    /// Side-load `image` if a side-loader is configured; no-op otherwise.
    pub async fn sideload(&self, image: &ImageRef) -> Result<()> {
        let Some(sideloader) = &self.sideloader else {
            return Ok(());
        };
        if !self.image_exists(image, true).await? {
            return Err(Error::ImageNotFound(image.to_string()));
        }
        let name = image.to_string();
        self.deadline().run(sideloader.load(&name)).await
    }

    /// Make sure the image for `identity` exists, building it if needed.
    pub async fn ensure_image(
        &self,
        component: &ComponentDir,
        identity: &ComponentIdentity,
        opts: BuildOptions,
    ) -> Result<ImageRef> {
        let image = self.image_ref(identity);

        if !(opts.force || opts.no_cache) && self.image_exists(&image, false).await? {
            tracing::info!("Component image '{image}' exists, skipping build");
            if opts.sideload {
                self.sideload(&image).await?;
            }
            return Ok(image);
        }

        tracing::info!("Building component image '{image}'");
        let request = self.build_request(component, identity, &image, opts.no_cache)?;
        tracing::debug!("Build args: {:?}", request.build_args);

        let failure = self
            .deadline()
            .run(async {
                let stream = self.engine.build(request).await?;
                log::drain(stream).await
            })
            .await?;
        if let Some(message) = failure {
            return Err(Error::ImageBuildFailed {
                image: image.to_string(),
                message,
            });
        }

        if opts.push && self.target.is_local_only() {
            tracing::debug!("Local registry is set, image push is skipped");
        } else if opts.push {
            self.push(&image).await?;
        }

        if opts.sideload {
            self.sideload(&image).await?;
        }
        Ok(image)
    }

    async fn push(&self, image: &ImageRef) -> Result<()> {
        tracing::info!("Pushing component image '{image}'");
        let name = image.to_string();
        let auth = self.target.engine_auth();
        let failure = self
            .deadline()
            .run(async {
                let stream = self.engine.push(&name, auth.as_ref()).await?;
                log::drain(stream).await
            })
            .await
            .map_err(|err| match err {
                Error::Engine { message, .. } => Error::ImagePushFailed {
                    image: name.clone(),
                    message,
                },
                other => other,
            })?;
        match failure {
            Some(message) => Err(Error::ImagePushFailed {
                image: name,
                message,
            }),
            None => Ok(()),
        }
    }

    fn build_request(
        &self,
        component: &ComponentDir,
        identity: &ComponentIdentity,
        image: &ImageRef,
        no_cache: bool,
    ) -> Result<BuildRequest> {
        let root = self.layout.repo_root();
        let custom = root.join(&component.repo_subpath).join("Dockerfile");
        let recipe = match std::fs::read(&custom) {
            Ok(bytes) => {
                tracing::debug!("Using custom Dockerfile '{}'", custom.display());
                bytes
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Using default Dockerfile");
                DEFAULT_RECIPE.as_bytes().to_vec()
            }
            Err(err) => return Err(err.into()),
        };
        let context = build_context(root, &recipe)?;

        let head = self.vcs.head_ref()?;
        let now = chrono::Utc::now().to_rfc3339();

        let build_args: BTreeMap<String, String> = [
            ("APP_YAML", self.layout.app_file_subpath()),
            ("BUILD_DATE", now.clone()),
            ("COMPONENT", identity.component_name.clone()),
            ("COMPONENT_DIR", component.repo_subpath_slash()),
            ("COMPONENT_COMMIT", identity.content_hash.clone()),
            ("HEAD_REF", head.branch.clone().unwrap_or_default()),
            ("TAG_REF", head.tag.clone().unwrap_or_default()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let labels: BTreeMap<String, String> = [
            (LABEL_COMPONENT, identity.component_name.clone()),
            (LABEL_OCI_CREATED, now),
            (LABEL_OCI_REVISION, identity.content_hash.clone()),
            (LABEL_OCI_SOURCE, self.vcs.remote_url().unwrap_or_default()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Ok(BuildRequest {
            context,
            dockerfile: INJECTED_RECIPE.to_string(),
            tags: vec![image.to_string()],
            build_args,
            labels,
            no_cache,
        })
    }
}
