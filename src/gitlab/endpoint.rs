//! GitLab HTTP Endpoint
//!
//! [`Endpoint`] is the request executor for the GitLab REST API. Every call
//! goes through the same path:
//!
//! 1. build the request (JSON body, bearer token)
//! 2. wait for a slot on the shared [`RateLimiter`]
//! 3. send it, racing the cancellation signal
//! 4. require `200 OK`, decode the JSON body, resolve the `link` header cursor
//!
//! # Example
//!
//! ```ignore
//! use registry_usage::gitlab::{Endpoint, RegistryApi};
//!
//! let gitlab = Endpoint::new("https://git.example.com", Some(token), 10.0)?;
//! let groups = gitlab.list_groups(&cancel).await.into_result()?;
//! ```

use super::error::ApiError;
use super::pagination::{next_page, walk, Listing};
use super::types::{ContainerRepository, Group, Tag, TagDetails};
use crate::cancel::CancelToken;
use crate::rate_limit::RateLimiter;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{CONTENT_TYPE, LINK};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// API prefix appended to the configured base URL
pub const API_PREFIX: &str = "/api/v4";

/// Characters left as-is in a tag name path segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Read side of the GitLab API used by the usage aggregator
///
/// Implemented by [`Endpoint`]; tests substitute an in-memory fake.
#[allow(async_fn_in_trait)]
pub trait RegistryApi {
    /// List all groups in a GitLab install
    async fn list_groups(&self, cancel: &CancelToken) -> Listing<Group>;

    /// List all container registries in a group, with tag stubs
    async fn list_registries_in_group(
        &self,
        cancel: &CancelToken,
        group: &Group,
    ) -> Listing<ContainerRepository>;

    /// Fetch the details of one tag and merge them into `tag`
    async fn get_registry_tag_info(
        &self,
        cancel: &CancelToken,
        registry: &ContainerRepository,
        tag: &mut Tag,
    ) -> Result<(), ApiError>;
}

/// Normalize a user supplied GitLab URL to its API base
///
/// Trailing slashes and an existing `/api/v4` suffix are removed before
/// `/api/v4` is appended, so both `https://git.example.com` and
/// `https://git.example.com/api/v4/` give `https://git.example.com/api/v4`.
pub fn normalize_base_url(url: &str) -> String {
    let mut base = url.trim().trim_end_matches('/');
    while let Some(stripped) = base.strip_suffix(API_PREFIX) {
        base = stripped.trim_end_matches('/');
    }
    format!("{}{}", base, API_PREFIX)
}

/// Authenticated, rate-limited GitLab API client
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Reqwest HTTP client
    client: reqwest::Client,

    /// API base, always ending in `/api/v4`
    base_url: String,

    /// Bearer token; `None` or empty sends no Authorization header
    token: Option<String>,

    /// Limiter shared by every request made through this endpoint
    limiter: Arc<RateLimiter>,

    /// Per-request timeout, if any
    timeout: Option<Duration>,
}

impl Endpoint {
    /// Create an endpoint for `base_url` limited to `requests_per_second`
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidConfig`] if the URL does not parse or the
    /// rate is not a positive number.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        requests_per_second: f64,
    ) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(base_url);
        reqwest::Url::parse(&base_url)
            .map_err(|e| ApiError::InvalidConfig(format!("invalid GitLab URL {}: {}", base_url, e)))?;

        Ok(Self {
            client: build_client(None)?,
            base_url,
            token,
            limiter: Arc::new(RateLimiter::new(requests_per_second)?),
            timeout: None,
        })
    }

    /// Apply a per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ApiError> {
        self.client = build_client(Some(timeout))?;
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Share an existing limiter instead of the endpoint's own
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// The normalized API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The rate limiter gating this endpoint
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The per-request timeout, if one was set
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Join an API path onto the base URL
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Run one request against the GitLab API
    ///
    /// Returns the decoded body and the next-page cursor (empty if none).
    ///
    /// # Errors
    ///
    /// - [`ApiError::Encode`] if `body` cannot be serialized
    /// - [`ApiError::Canceled`] if `cancel` fires while waiting or in flight
    /// - [`ApiError::Transport`] if the request could not be sent
    /// - [`ApiError::Status`] for any status other than 200
    /// - [`ApiError::Body`] / [`ApiError::Decode`] for unreadable or invalid JSON
    pub async fn execute<B, T>(
        &self,
        cancel: &CancelToken,
        url: &str,
        method: Method,
        body: Option<&B>,
    ) -> Result<(T, String), ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            let json = serde_json::to_vec(body).map_err(ApiError::Encode)?;
            request = request.header(CONTENT_TYPE, "application/json").body(json);
        }
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        self.limiter.acquire(cancel).await?;

        tracing::debug!("{} {}", method, url);

        let response = tokio::select! {
            biased;
            _ = cancel.canceled() => return Err(ApiError::Canceled),
            result = request.send() => result.map_err(|source| ApiError::Transport {
                method: method.clone(),
                url: url.to_string(),
                source,
            })?,
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ApiError::Status {
                status,
                method,
                url: url.to_string(),
            });
        }

        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(next_page)
            .unwrap_or_default();

        let text = tokio::select! {
            biased;
            _ = cancel.canceled() => return Err(ApiError::Canceled),
            result = response.text() => result.map_err(|source| ApiError::Body {
                method: method.clone(),
                url: url.to_string(),
                source,
            })?,
        };

        match serde_json::from_str::<T>(&text) {
            Ok(value) => Ok((value, next)),
            Err(source) => Err(ApiError::Decode { source, body: text }),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        cancel: &CancelToken,
        url: &str,
    ) -> Result<(T, String), ApiError> {
        self.execute::<(), T>(cancel, url, Method::GET, None).await
    }
}

impl RegistryApi for Endpoint {
    // Gitlab docs: https://docs.gitlab.com/ee/api/groups.html#list-groups
    async fn list_groups(&self, cancel: &CancelToken) -> Listing<Group> {
        let start = self.endpoint_url("groups");
        walk("listing groups", start, |url| async move {
            self.get::<Vec<Group>>(cancel, &url).await
        })
        .await
    }

    // Gitlab docs: https://docs.gitlab.com/ee/api/container_registry.html#within-a-group
    async fn list_registries_in_group(
        &self,
        cancel: &CancelToken,
        group: &Group,
    ) -> Listing<ContainerRepository> {
        let start = self.endpoint_url(&format!("groups/{}/registry/repositories?tags=1", group.id));
        let operation = format!("listing repos for group {}", group.path);
        walk(&operation, start, |url| async move {
            self.get::<Vec<ContainerRepository>>(cancel, &url).await
        })
        .await
    }

    // Gitlab docs: https://docs.gitlab.com/ee/api/container_registry.html#get-details-of-a-registry-repository-tag
    async fn get_registry_tag_info(
        &self,
        cancel: &CancelToken,
        registry: &ContainerRepository,
        tag: &mut Tag,
    ) -> Result<(), ApiError> {
        let url = self.endpoint_url(&format!(
            "projects/{}/registry/repositories/{}/tags/{}",
            registry.project_id,
            registry.id,
            utf8_percent_encode(&tag.name, PATH_SEGMENT)
        ));

        let (details, _) = self
            .get::<TagDetails>(cancel, &url)
            .await
            .map_err(|e| {
                e.context(format!(
                    "getting tag details for container repository {}",
                    tag.path
                ))
            })?;

        tag.merge(details);
        Ok(())
    }
}

fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client, ApiError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| ApiError::InvalidConfig(format!("failed to build HTTP client: {}", e)))
}
