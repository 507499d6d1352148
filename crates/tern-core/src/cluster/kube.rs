//! Kubernetes REST API client with bearer-token auth.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{Labels, Orchestrator, Resource, ResourceKind};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct KubeClient {
    client: Client,
    server: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListBody {
    #[serde(default)]
    items: Vec<Value>,
}

impl KubeClient {
    pub fn new(server: &str, token: Option<String>, insecure: bool) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tern/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(insecure)
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server)
    }

    async fn check(response: Response, kind: ResourceKind, name: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StatusBody>(&body)
            .map(|s| s.message)
            .unwrap_or(body);
        Err(match status {
            StatusCode::NOT_FOUND => Error::ResourceNotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            StatusCode::CONFLICT => Error::ApplyConflict {
                kind: kind.to_string(),
                name: name.to_string(),
                message,
            },
            other => Error::Api {
                status: other.as_u16(),
                message,
            },
        })
    }

    async fn send_object(
        &self,
        builder: RequestBuilder,
        resource: &Resource,
        dry_run: bool,
    ) -> Result<Resource> {
        let mut builder = self.request(builder).json(&resource.to_value()?);
        if dry_run {
            builder = builder.query(&[("dryRun", "All")]);
        }
        let response = builder.send().await?;
        let response = Self::check(response, resource.kind, resource.name()).await?;
        let value: Value = response.json().await?;
        Resource::from_value(resource.kind, value)
    }
}

fn label_selector(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl Orchestrator for KubeClient {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Resource> {
        let url = self.url(&kind.item_path(namespace, name));
        let response = self.request(self.client.get(url)).send().await?;
        let response = Self::check(response, kind, name).await?;
        let value: Value = response.json().await?;
        Resource::from_value(kind, value)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        labels: &Labels,
    ) -> Result<Vec<Resource>> {
        let url = self.url(&kind.collection_path(namespace));
        let mut builder = self.request(self.client.get(url));
        if !labels.is_empty() {
            builder = builder.query(&[("labelSelector", label_selector(labels))]);
        }
        let response = builder.send().await?;
        let response = Self::check(response, kind, kind.plural()).await?;
        let body: ListBody = response.json().await?;
        body.items
            .into_iter()
            .map(|item| Resource::from_value(kind, item))
            .collect()
    }

    async fn create(&self, resource: &Resource, dry_run: bool) -> Result<Resource> {
        let url = self.url(&resource.kind.collection_path(resource.namespace()));
        self.send_object(self.client.post(url), resource, dry_run)
            .await
    }

    async fn update(&self, resource: &Resource, dry_run: bool) -> Result<Resource> {
        let url = self.url(
            &resource
                .kind
                .item_path(resource.namespace(), resource.name()),
        );
        self.send_object(self.client.put(url), resource, dry_run)
            .await
    }
}
