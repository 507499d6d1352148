//! Side-loading images into a local cluster that cannot pull from the registry.

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

#[async_trait]
pub trait Sideloader: Send + Sync {
    async fn load(&self, image: &str) -> Result<()>;
}

/// Runs `kind load docker-image --name=<cluster> <image>`.
#[derive(Debug, Clone)]
pub struct KindSideloader {
    cluster: String,
    program: String,
}

impl KindSideloader {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            program: "kind".to_string(),
        }
    }

    /// Use a different `kind` executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, image: &str) -> Vec<String> {
        vec![
            "load".to_string(),
            "docker-image".to_string(),
            format!("--name={}", self.cluster),
            image.to_string(),
        ]
    }
}

#[async_trait]
impl Sideloader for KindSideloader {
    async fn load(&self, image: &str) -> Result<()> {
        tracing::info!(
            "Loading component image '{image}' into kind cluster '{}'",
            self.cluster
        );
        let output = Command::new(&self.program)
            .args(self.args(image))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| Error::Sideload {
                image: image.to_string(),
                message: format!("failed to run '{}': {err}", self.program),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim();
        if !output.status.success() {
            return Err(Error::Sideload {
                image: image.to_string(),
                message: combined.to_string(),
            });
        }
        if !combined.is_empty() {
            tracing::debug!("{combined}");
        }
        Ok(())
    }
}
