//! In-memory implementations of the tern ports.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream;

use tern_core::cluster::{Labels, Orchestrator, Resource, ResourceKind};
use tern_core::engine::{BuildRequest, ContainerEngine, ContainerSpec, LogStream, RegistryAuth};
use tern_core::git::{CommitInfo, HeadRef, VersionControl};
use tern_core::prompt::Prompter;
use tern_core::registry::{ManifestLookup, RegistryCredentials};
use tern_core::sideload::Sideloader;
use tern_core::{Error, Result};

fn log_stream(lines: Vec<String>) -> LogStream {
    Box::pin(stream::iter(
        lines
            .into_iter()
            .map(|line| Ok(Bytes::from(format!("{line}\n")))),
    ))
}

/// Version control with a fixed history for every path.
pub struct FakeVcs {
    pub root: PathBuf,
    pub clean: bool,
    pub hash: String,
    pub head: HeadRef,
    pub tags: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn new(root: &Path, hash: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            clean: true,
            hash: hash.to_string(),
            head: HeadRef {
                branch: Some("refs/heads/main".to_string()),
                tag: None,
            },
            tags: Mutex::new(Vec::new()),
        }
    }
}

impl VersionControl for FakeVcs {
    fn root(&self) -> &Path {
        &self.root
    }

    fn is_clean(&self) -> Result<bool> {
        Ok(self.clean)
    }

    fn head_ref(&self) -> Result<HeadRef> {
        Ok(self.head.clone())
    }

    fn head_commit(&self) -> Result<CommitInfo> {
        Ok(CommitInfo {
            id: self.hash.clone(),
            time: Utc::now(),
            summary: "fake".to_string(),
        })
    }

    fn log(&self, _path_prefix: &Path, _limit: Option<usize>) -> Result<Vec<CommitInfo>> {
        Ok(vec![self.head_commit()?])
    }

    fn create_tag(&self, name: &str) -> Result<()> {
        self.tags.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn remote_url(&self) -> Option<String> {
        None
    }
}

#[derive(Default)]
pub struct EngineState {
    pub local_images: BTreeSet<String>,
    pub built: Vec<Vec<String>>,
    pub build_args: Vec<BTreeMap<String, String>>,
    pub pushed: Vec<String>,
    pub pulled: Vec<String>,
    pub created: Vec<ContainerSpec>,
    pub removed: Vec<String>,
}

/// Container engine that records calls and keeps images in memory.
#[derive(Default)]
pub struct FakeEngine {
    pub state: Mutex<EngineState>,
    /// Extra lines streamed by every build
    pub build_log: Vec<String>,
    /// Output of `-export` runs by image name
    pub exports: BTreeMap<String, String>,
    pub exit_code: i64,
}

impl FakeEngine {
    pub fn with_local_image(self, image: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .local_images
            .insert(image.to_string());
        self
    }

    pub fn with_build_log(mut self, lines: &[&str]) -> Self {
        self.build_log = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_export(mut self, image: &str, definition: &str) -> Self {
        self.exports
            .insert(image.to_string(), definition.to_string());
        self
    }

    pub fn built_count(&self) -> usize {
        self.state.lock().unwrap().built.len()
    }

    pub fn pushed(&self) -> Vec<String> {
        self.state.lock().unwrap().pushed.clone()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn image_exists_locally(&self, image: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().local_images.contains(image))
    }

    async fn build(&self, request: BuildRequest) -> Result<LogStream> {
        let mut state = self.state.lock().unwrap();
        state.built.push(request.tags.clone());
        state.build_args.push(request.build_args.clone());
        let failed = self
            .build_log
            .iter()
            .any(|l| l.contains("\"error\""));
        if !failed {
            state.local_images.extend(request.tags.iter().cloned());
        }
        let mut lines = vec![r#"{"stream":"Step 1/1 : FROM scratch"}"#.to_string()];
        lines.extend(self.build_log.iter().cloned());
        Ok(log_stream(lines))
    }

    async fn push(&self, image: &str, _auth: Option<&RegistryAuth>) -> Result<LogStream> {
        self.state.lock().unwrap().pushed.push(image.to_string());
        Ok(log_stream(vec![r#"{"status":"Pushed"}"#.to_string()]))
    }

    async fn pull(&self, image: &str, _auth: Option<&RegistryAuth>) -> Result<LogStream> {
        let mut state = self.state.lock().unwrap();
        state.pulled.push(image.to_string());
        state.local_images.insert(image.to_string());
        Ok(log_stream(vec![r#"{"status":"Pulled"}"#.to_string()]))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.created.push(spec.clone());
        Ok(format!("container-{}", state.created.len()))
    }

    async fn start_container(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn wait_container(&self, _id: &str) -> Result<i64> {
        Ok(self.exit_code)
    }

    async fn container_logs(&self, id: &str) -> Result<LogStream> {
        let state = self.state.lock().unwrap();
        let index: usize = id
            .trim_start_matches("container-")
            .parse()
            .unwrap_or_default();
        let image = state
            .created
            .get(index.saturating_sub(1))
            .map(|spec| spec.image.clone())
            .unwrap_or_default();
        let output = self.exports.get(&image).cloned().unwrap_or_default();
        Ok(log_stream(vec![output]))
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.state.lock().unwrap().removed.push(id.to_string());
        Ok(())
    }
}

/// Registry holding a set of image references.
#[derive(Default)]
pub struct FakeRegistry {
    pub images: Mutex<BTreeSet<String>>,
    pub lookups: Mutex<usize>,
}

impl FakeRegistry {
    pub fn with_image(self, image: &str) -> Self {
        self.images.lock().unwrap().insert(image.to_string());
        self
    }
}

#[async_trait]
impl ManifestLookup for FakeRegistry {
    async fn manifest_exists(
        &self,
        image: &str,
        _credentials: Option<&RegistryCredentials>,
    ) -> Result<bool> {
        *self.lookups.lock().unwrap() += 1;
        Ok(self.images.lock().unwrap().contains(image))
    }
}

#[derive(Default)]
pub struct FakeSideloader {
    pub loaded: Mutex<Vec<String>>,
}

impl FakeSideloader {
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sideloader for FakeSideloader {
    async fn load(&self, image: &str) -> Result<()> {
        self.loaded.lock().unwrap().push(image.to_string());
        Ok(())
    }
}

type ObjectKey = (ResourceKind, Option<String>, String);

#[derive(Default)]
pub struct ClusterState {
    pub objects: BTreeMap<ObjectKey, Resource>,
    pub next_version: u64,
    /// Every create/update as `"<verb> <Kind> <key>"`
    pub mutations: Vec<String>,
}

/// Orchestrator backed by an in-memory object map.
///
/// `create` and `update` enforce the same conflict rules as the API server:
/// a create of an existing object and an update with a stale
/// `resourceVersion` both fail with [`Error::ApplyConflict`].
#[derive(Default)]
pub struct FakeOrchestrator {
    pub state: Mutex<ClusterState>,
    /// Fail every `list` call
    pub list_error: bool,
}

impl FakeOrchestrator {
    pub fn with_failing_list(mut self) -> Self {
        self.list_error = true;
        self
    }

    fn key(resource: &Resource) -> ObjectKey {
        (
            resource.kind,
            resource.namespace().map(str::to_string),
            resource.name().to_string(),
        )
    }

    /// Store `resource` directly, assigning a fresh resource version.
    pub fn seed(&self, mut resource: Resource) -> Resource {
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        resource.metadata.resource_version = Some(state.next_version.to_string());
        state
            .objects
            .insert(Self::key(&resource), resource.clone());
        resource
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn all(&self, kind: ResourceKind) -> Vec<Resource> {
        self.state
            .lock()
            .unwrap()
            .objects
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn object(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Option<Resource> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(kind, namespace.map(str::to_string), name.to_string()))
            .cloned()
    }

    fn conflict(resource: &Resource, message: &str) -> Error {
        Error::ApplyConflict {
            kind: resource.kind.to_string(),
            name: resource.name().to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Resource> {
        let namespace = namespace.filter(|_| kind.is_namespaced());
        self.object(kind, namespace, name)
            .ok_or_else(|| Error::ResourceNotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        labels: &Labels,
    ) -> Result<Vec<Resource>> {
        if self.list_error {
            return Err(Error::Api {
                status: 500,
                message: "etcdserver: request timed out".to_string(),
            });
        }
        Ok(self
            .all(kind)
            .into_iter()
            .filter(|r| namespace.is_none() || r.namespace() == namespace)
            .filter(|r| {
                labels
                    .iter()
                    .all(|(k, v)| r.metadata.labels.get(k) == Some(v))
            })
            .collect())
    }

    async fn create(&self, resource: &Resource, dry_run: bool) -> Result<Resource> {
        let mut state = self.state.lock().unwrap();
        let key = Self::key(resource);
        if state.objects.contains_key(&key) {
            return Err(Self::conflict(resource, "already exists"));
        }
        let mut created = resource.clone();
        if dry_run {
            return Ok(created);
        }
        state.next_version += 1;
        created.metadata.resource_version = Some(state.next_version.to_string());
        state
            .mutations
            .push(format!("create {} {}", resource.kind, resource.key()));
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, resource: &Resource, dry_run: bool) -> Result<Resource> {
        let mut state = self.state.lock().unwrap();
        let key = Self::key(resource);
        let Some(current) = state.objects.get(&key) else {
            return Err(Error::ResourceNotFound {
                kind: resource.kind.to_string(),
                name: resource.name().to_string(),
            });
        };
        if current.metadata.resource_version != resource.metadata.resource_version {
            return Err(Self::conflict(resource, "resourceVersion is stale"));
        }
        let mut updated = resource.clone();
        if dry_run {
            return Ok(updated);
        }
        state.next_version += 1;
        updated.metadata.resource_version = Some(state.next_version.to_string());
        state
            .mutations
            .push(format!("update {} {}", resource.kind, resource.key()));
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }
}

/// Prompter answering from a script; runs out into "no interactive input".
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    pub said: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
    /// Time the operator takes to answer
    delay: Duration,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn said(&self) -> Vec<String> {
        self.said.lock().unwrap().clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl Prompter for ScriptedPrompter {
    fn read_line(&self, prompt: &str) -> Result<Option<String>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        std::thread::sleep(self.delay);
        Ok(self.answers.lock().unwrap().pop_front())
    }

    fn say(&self, line: &str) {
        self.said.lock().unwrap().push(line.to_string());
    }
}
