//! OCI distribution API client.
//!
//! Only manifest existence is needed: a `HEAD` on
//! `/v2/<repository>/manifests/<tag>`, answering Bearer-token challenges with
//! the configured credentials. Loopback registries (`localhost:5000`) are
//! reached over plain HTTP, like the Docker daemon does.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, WWW_AUTHENTICATE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::config::RegistrySettings;
use crate::engine::split_image_tag;
use crate::error::{Error, Result};

const MANIFEST_TYPES: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.oci.image.manifest.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.docker.distribution.manifest.v2+json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

#[async_trait]
pub trait ManifestLookup: Send + Sync {
    async fn manifest_exists(
        &self,
        image: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    plain_http: bool,
}

/// True for `localhost`, `127.0.0.0/8` and `[::1]`, with or without a port.
pub fn is_loopback_host(host: &str) -> bool {
    let name = match host.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or(rest),
        None => host.split(':').next().unwrap_or(host),
    };
    name.eq_ignore_ascii_case("localhost")
        || name.starts_with("127.")
        || name == "::1"
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Parsed `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl Challenge {
    pub(crate) fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Challenge::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let mut values: HashMap<String, String> = HashMap::new();
        let mut rest = params.trim();
        while !rest.is_empty() {
            let Some((key, after)) = rest.split_once('=') else {
                break;
            };
            let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
            let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
                match quoted.split_once('"') {
                    Some((value, remaining)) => (value, remaining),
                    None => (quoted, ""),
                }
            } else {
                after.split_once(',').unwrap_or((after, ""))
            };
            values.insert(key, value.to_string());
            rest = remaining.trim_start_matches(',').trim();
        }
        Some(Challenge::Bearer {
            realm: values.remove("realm")?,
            service: values.remove("service"),
            scope: values.remove("scope"),
        })
    }
}

impl RegistryClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tern/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            plain_http: false,
        })
    }

    /// Client for the configured registry.
    pub fn for_settings(settings: &RegistrySettings) -> Result<Self> {
        let client = Self::new()?;
        Ok(if settings.plain_http {
            client.with_plain_http()
        } else {
            client
        })
    }

    /// Talk plain HTTP to every registry, not just loopback ones.
    pub fn with_plain_http(mut self) -> Self {
        self.plain_http = true;
        self
    }

    fn scheme(&self, host: &str) -> &'static str {
        if self.plain_http || is_loopback_host(host) {
            "http"
        } else {
            "https"
        }
    }

    fn manifest_url(&self, image: &str) -> Result<Url> {
        let (repo, tag) = split_image_tag(image);
        let (host, path) = repo
            .split_once('/')
            .ok_or_else(|| Error::Config(format!("image '{image}' has no registry host")))?;
        let invalid = |err: url::ParseError| Error::Config(format!("invalid image '{image}': {err}"));
        Url::parse(&format!("{}://{host}/", self.scheme(host)))
            .map_err(invalid)?
            .join(&format!("v2/{path}/manifests/{}", tag.unwrap_or("latest")))
            .map_err(invalid)
    }

    fn head(&self, url: &Url) -> RequestBuilder {
        self.client.head(url.clone()).header(ACCEPT, MANIFEST_TYPES)
    }

    async fn fetch_token(
        &self,
        realm: &str,
        service: Option<&str>,
        scope: Option<&str>,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<String> {
        let mut query = Vec::new();
        if let Some(service) = service {
            query.push(("service", service));
        }
        if let Some(scope) = scope {
            query.push(("scope", scope));
        }
        let mut req = self.client.get(realm).query(&query);
        if let Some(creds) = credentials {
            req = req.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = req.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::CredentialError(format!(
                "token endpoint '{realm}' returned HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: format!("token request to '{realm}' failed"),
            });
        }
        let body: TokenResponse = response.json().await?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| Error::CredentialError(format!("no token returned by '{realm}'")))
    }
}

fn classify(status: StatusCode, image: &str) -> Result<bool> {
    match status {
        s if s.is_success() => Ok(true),
        StatusCode::NOT_FOUND => Ok(false),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::CredentialError(format!(
            "registry refused access to '{image}' (HTTP {status})"
        ))),
        other => Err(Error::Api {
            status: other.as_u16(),
            message: format!("manifest lookup for '{image}' failed"),
        }),
    }
}

#[async_trait]
impl ManifestLookup for RegistryClient {
    async fn manifest_exists(
        &self,
        image: &str,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<bool> {
        let url = self.manifest_url(image)?;
        let response = self.head(&url).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return classify(response.status(), image);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(Challenge::parse);
        let retry = match challenge {
            Some(Challenge::Bearer {
                realm,
                service,
                scope,
            }) => {
                let token = self
                    .fetch_token(&realm, service.as_deref(), scope.as_deref(), credentials)
                    .await?;
                self.head(&url).bearer_auth(token)
            }
            Some(Challenge::Basic) => match credentials {
                Some(creds) => self
                    .head(&url)
                    .basic_auth(&creds.username, Some(&creds.password)),
                None => return classify(StatusCode::UNAUTHORIZED, image),
            },
            None => return classify(StatusCode::UNAUTHORIZED, image),
        };

        let response = retry.send().await?;
        let found = classify(response.status(), image)?;
        tracing::debug!("Manifest for '{image}' exists: {found}");
        Ok(found)
    }
}
