//! Docker Engine API client over plain HTTP.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{BuildRequest, ContainerEngine, ContainerSpec, LogStream, RegistryAuth, split_image_tag};
use crate::error::{Error, Result};

const API_VERSION: &str = "v1.43";

#[derive(Debug, Clone)]
pub struct DockerEngine {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct EngineMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedContainer {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WaitResponse {
    status_code: i64,
}

impl DockerEngine {
    /// `endpoint` is an `http://host:port` URL, see
    /// [`TernConfig::docker_endpoint`](crate::config::TernConfig::docker_endpoint).
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tern/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/{API_VERSION}", endpoint.trim_end_matches('/')),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<EngineMessage>(&body)
            .map(|m| m.message)
            .unwrap_or(body);
        Err(Error::Engine {
            status: status.as_u16(),
            message,
        })
    }

    fn stream(response: Response) -> LogStream {
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn image_exists_locally(&self, image: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&format!("/images/{image}/json")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Image '{image}' not found locally");
            return Ok(false);
        }
        Self::check(response).await?;
        tracing::debug!("Image '{image}' found locally");
        Ok(true)
    }

    async fn build(&self, request: BuildRequest) -> Result<LogStream> {
        let mut query: Vec<(&str, String)> = vec![
            ("dockerfile", request.dockerfile.clone()),
            ("rm", "true".to_string()),
            ("nocache", request.no_cache.to_string()),
            ("buildargs", serde_json::to_string(&request.build_args)?),
            ("labels", serde_json::to_string(&request.labels)?),
        ];
        for tag in &request.tags {
            query.push(("t", tag.clone()));
        }

        let response = self
            .client
            .post(self.url("/build"))
            .query(&query)
            .header("Content-Type", "application/x-tar")
            .body(request.context)
            .send()
            .await?;
        Ok(Self::stream(Self::check(response).await?))
    }

    async fn push(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<LogStream> {
        let (repo, tag) = split_image_tag(image);
        let mut req = self
            .client
            .post(self.url(&format!("/images/{repo}/push")))
            .query(&[("tag", tag.unwrap_or("latest"))]);
        if let Some(auth) = auth {
            req = req.header("X-Registry-Auth", auth.header_value()?);
        }
        let response = req.send().await?;
        Ok(Self::stream(Self::check(response).await?))
    }

    async fn pull(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<LogStream> {
        let (repo, tag) = split_image_tag(image);
        let mut req = self
            .client
            .post(self.url("/images/create"))
            .query(&[("fromImage", repo), ("tag", tag.unwrap_or("latest"))]);
        if let Some(auth) = auth {
            req = req.header("X-Registry-Auth", auth.header_value()?);
        }
        let response = req.send().await?;
        Ok(Self::stream(Self::check(response).await?))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let body = json!({
            "Image": spec.image,
            "Cmd": spec.cmd,
            "Tty": spec.tty,
        });
        let response = self
            .client
            .post(self.url("/containers/create"))
            .json(&body)
            .send()
            .await?;
        let created: CreatedContainer = Self::check(response).await?.json().await?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/containers/{id}/start")))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let response = self
            .client
            .post(self.url(&format!("/containers/{id}/wait")))
            .query(&[("condition", "not-running")])
            .send()
            .await?;
        let waited: WaitResponse = Self::check(response).await?.json().await?;
        Ok(waited.status_code)
    }

    async fn container_logs(&self, id: &str) -> Result<LogStream> {
        let response = self
            .client
            .get(self.url(&format!("/containers/{id}/logs")))
            .query(&[("stdout", "true"), ("stderr", "false")])
            .send()
            .await?;
        Ok(Self::stream(Self::check(response).await?))
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/containers/{id}")))
            .query(&[("force", "true")])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
