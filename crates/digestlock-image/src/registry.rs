//! Registry-backed digest resolution.
//!
//! Issues `HEAD /v2/<repository>/manifests/<tag>` and reads the
//! `Docker-Content-Digest` header. A `401` answer is retried once with a
//! token obtained from the `WWW-Authenticate` challenge.

use async_trait::async_trait;
use digestlock_common::config::RegistryConfig;
use digestlock_common::constants::{DEFAULT_TAG, DIGEST_PREFIX, SHA256_HEX_LENGTH};
use digestlock_common::error::{DigestlockError, Result};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, WWW_AUTHENTICATE};
use serde::Deserialize;

use crate::resolver::DigestResolver;

const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library";
const DIGEST_HEADER: &str = "Docker-Content-Digest";

const MANIFEST_MEDIA_TYPES: &str = "application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.oci.image.manifest.v1+json";

/// Registry host and repository path derived from an image name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryTarget {
    /// Registry host, possibly with a port.
    pub host: String,
    /// Repository path within the registry.
    pub repository: String,
}

impl RegistryTarget {
    /// Splits an image name into registry host and repository.
    ///
    /// Names without a registry component resolve against Docker Hub, where
    /// single-segment names live under `library/`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => {
                let host = if first == "docker.io" || first == "index.docker.io" {
                    DOCKER_HUB_REGISTRY.to_string()
                } else {
                    first.to_string()
                };
                let repository = if host == DOCKER_HUB_REGISTRY && !rest.contains('/') {
                    format!("{OFFICIAL_REPO_PREFIX}/{rest}")
                } else {
                    rest.to_string()
                };
                Self { host, repository }
            }
            Some(_) => Self {
                host: DOCKER_HUB_REGISTRY.to_string(),
                repository: name.to_string(),
            },
            None => Self {
                host: DOCKER_HUB_REGISTRY.to_string(),
                repository: format!("{OFFICIAL_REPO_PREFIX}/{name}"),
            },
        }
    }

    /// URL of the manifest for `reference`.
    #[must_use]
    pub fn manifest_url(&self, reference: &str) -> String {
        let scheme = if self.is_local() { "http" } else { "https" };
        format!(
            "{scheme}://{}/v2/{}/manifests/{reference}",
            self.host, self.repository
        )
    }

    fn is_local(&self) -> bool {
        let host = self.host.split(':').next().unwrap_or_default();
        host == "localhost" || host == "127.0.0.1"
    }
}

fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl Challenge {
    fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Self::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in challenge_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }
        Some(Self::Bearer {
            realm: realm?,
            service,
            scope,
        })
    }
}

/// Splits `key="value",key=value` pairs, honouring quotes.
fn challenge_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = params.trim();
    while let Some((key, after)) = rest.split_once('=') {
        let key = key.trim().trim_start_matches(',').trim().to_string();
        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.split_once('"') {
                Some((value, remaining)) => (value.to_string(), remaining),
                None => (quoted.to_string(), ""),
            }
        } else {
            match after.split_once(',') {
                Some((value, remaining)) => (value.trim().to_string(), remaining),
                None => (after.trim().to_string(), ""),
            }
        };
        pairs.push((key, value));
        rest = remaining.trim_start_matches(',').trim();
    }
    pairs
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Resolves digests by querying the image's registry over HTTP.
#[derive(Debug, Clone)]
pub struct RegistryResolver {
    client: reqwest::Client,
    config: RegistryConfig,
}

impl RegistryResolver {
    /// Creates a resolver with optional credentials.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.config.username, &self.config.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    async fn head_manifest(
        &self,
        url: &str,
        auth: Option<&Authorization>,
    ) -> reqwest::Result<reqwest::Response> {
        let mut request = self
            .client
            .head(url)
            .header(ACCEPT, MANIFEST_MEDIA_TYPES);
        request = match auth {
            Some(Authorization::Bearer(token)) => request.bearer_auth(token),
            Some(Authorization::Basic(user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        };
        request.send().await
    }

    async fn fetch_token(
        &self,
        realm: &str,
        service: Option<&str>,
        scope: Option<&str>,
    ) -> reqwest::Result<Option<String>> {
        let mut query = Vec::new();
        if let Some(service) = service {
            query.push(("service", service));
        }
        if let Some(scope) = scope {
            query.push(("scope", scope));
        }
        let mut request = self.client.get(realm).query(&query);
        if let Some((user, pass)) = self.credentials() {
            request = request.basic_auth(user, Some(pass));
        }
        let response: TokenResponse = request.send().await?.error_for_status()?.json().await?;
        Ok(response.token.or(response.access_token))
    }

    async fn authorize(
        &self,
        headers: &HeaderMap,
        repository: &str,
    ) -> std::result::Result<Authorization, String> {
        let header = headers
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or("registry requires authentication but sent no challenge")?;
        match Challenge::parse(header) {
            Some(Challenge::Basic) => {
                let (user, pass) = self
                    .credentials()
                    .ok_or("registry requires basic credentials")?;
                Ok(Authorization::Basic(user.to_string(), pass.to_string()))
            }
            Some(Challenge::Bearer {
                realm,
                service,
                scope,
            }) => {
                let scope = scope.unwrap_or_else(|| format!("repository:{repository}:pull"));
                let token = self
                    .fetch_token(&realm, service.as_deref(), Some(&scope))
                    .await
                    .map_err(|e| format!("token request failed: {e}"))?
                    .ok_or("token response carried no token")?;
                Ok(Authorization::Bearer(token))
            }
            None => Err(format!("unsupported authentication challenge: {header}")),
        }
    }
}

/// Extracts the hex part of a `sha256:<hex>` content digest.
fn sha256_hex(header: &str) -> std::result::Result<String, String> {
    let hex = header
        .trim()
        .strip_prefix(DIGEST_PREFIX)
        .ok_or_else(|| format!("unsupported digest algorithm in {header:?}"))?;
    if hex.len() != SHA256_HEX_LENGTH || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("malformed sha256 digest {header:?}"));
    }
    Ok(hex.to_ascii_lowercase())
}

#[derive(Debug, Clone)]
enum Authorization {
    Bearer(String),
    Basic(String, String),
}

#[async_trait]
impl DigestResolver for RegistryResolver {
    async fn resolve(&self, name: &str, tag: &str) -> Result<String> {
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };
        let target = RegistryTarget::from_name(name);
        let url = target.manifest_url(tag);
        let fail = |message: String| DigestlockError::Resolve {
            name: name.to_string(),
            tag: tag.to_string(),
            message,
        };

        tracing::debug!(name, tag, url = %url, "querying registry");
        let mut response = self
            .head_manifest(&url, None)
            .await
            .map_err(|e| fail(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let auth = self
                .authorize(response.headers(), &target.repository)
                .await
                .map_err(fail)?;
            response = self
                .head_manifest(&url, Some(&auth))
                .await
                .map_err(|e| fail(e.to_string()))?;
        }

        if !response.status().is_success() {
            return Err(fail(format!("registry answered {}", response.status())));
        }

        let digest = response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| fail(format!("response carried no {DIGEST_HEADER} header")))?;
        let digest = sha256_hex(digest).map_err(fail)?;
        tracing::info!(name, tag, digest = %digest, "resolved digest");
        Ok(digest)
    }
}
