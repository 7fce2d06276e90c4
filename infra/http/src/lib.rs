//! # Outbound HTTP Infrastructure
//!
//! Shared HTTP client resource for calls to collaborating services. One
//! client instance is pooled and reused across the whole process; request
//! helpers classify upstream failures into the domain taxonomy.
//!
//! ## Example
//!
//! ```rust,no_run
//! use keel_http::HttpClient;
//!
//! # async fn example() -> Result<(), keel_http::HttpError> {
//! let client = HttpClient::builder()
//!     .base_url("https://upstream.internal")
//!     .api_key("s3cr3t")
//!     .init()?;
//!
//! let status: serde_json::Value = client.get_json("/api/status").await?;
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::HttpError;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug)]
struct HttpClientInner {
    client: reqwest::Client,
    base_url: Option<Url>,
}

/// Shared outbound HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

impl HttpClient {
    /// Creates a new [`HttpClientBuilder`].
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Prepares a request against `path`, resolved against the base URL
    /// when one is configured; absolute URLs pass through unchanged.
    ///
    /// # Errors
    /// Returns [`HttpError::Validation`] if the path cannot be resolved
    /// into a valid URL.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, HttpError> {
        let url = self.resolve(path)?;
        Ok(self.inner.client.request(method, url))
    }

    /// Issues a GET and decodes the JSON success body.
    ///
    /// # Errors
    /// [`HttpError::Status`] for error responses (with the JSON `detail`
    /// extracted when the upstream provides one), [`HttpError::Request`]
    /// for transport failures, [`HttpError::Decode`] for body mismatches.
    #[instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        let response = self.request(Method::GET, path)?.send().await?;
        let response = check(response).await?;
        response.json().await.map_err(|source| HttpError::Decode { source, context: None })
    }

    /// Issues a POST with a JSON body and decodes the JSON success body.
    ///
    /// # Errors
    /// Same contract as [`HttpClient::get_json`].
    #[instrument(skip(self, body))]
    pub async fn post_json<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let response = self.request(Method::POST, path)?.json(body).send().await?;
        let response = check(response).await?;
        response.json().await.map_err(|source| HttpError::Decode { source, context: None })
    }

    fn resolve(&self, path: &str) -> Result<Url, HttpError> {
        let url = match &self.inner.base_url {
            Some(base) => base.join(path),
            None => Url::parse(path),
        };
        url.map_err(|e| HttpError::Validation {
            message: format!("Invalid request path '{path}': {e}").into(),
            context: None,
        })
    }
}

/// Rejects error responses, extracting the JSON `detail` field (or raw body)
/// the upstream sent along.
async fn check(response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return Ok(response);
    }

    let detail = match response.text().await {
        Ok(body) => serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("detail").map(|d| d.as_str().map_or_else(|| d.to_string(), str::to_owned))
            })
            .unwrap_or(body),
        Err(_) => String::new(),
    };

    debug!(status = status.as_u16(), %detail, "Upstream rejected request");
    Err(HttpError::Status { status: status.as_u16(), detail })
}

/// A fluent builder for configuring the shared HTTP client.
#[must_use = "builders do nothing unless you call .init()"]
#[derive(Debug, Default)]
pub struct HttpClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    api_key: Option<String>,
    user_agent: Option<String>,
}

impl HttpClientBuilder {
    /// Sets the base URL that relative request paths resolve against.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Overall per-request timeout (default 30 seconds).
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// API key sent as `X-Api-Key` on every request.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Overrides the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Consumes the builder and constructs the shared client.
    ///
    /// # Errors
    /// * [`HttpError::Validation`] for an unparsable base URL or API key.
    /// * [`HttpError::Request`] if the underlying client cannot be built.
    pub fn init(self) -> Result<HttpClient, HttpError> {
        let base_url = self
            .base_url
            .map(|raw| {
                // A trailing slash keeps Url::join from clobbering the last
                // path segment of the base.
                let normalized =
                    if raw.ends_with('/') { raw } else { format!("{raw}/") };
                Url::parse(&normalized).map_err(|e| HttpError::Validation {
                    message: format!("Invalid base URL '{normalized}': {e}").into(),
                    context: None,
                })
            })
            .transpose()?;

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            let mut value =
                HeaderValue::from_str(api_key).map_err(|e| HttpError::Validation {
                    message: format!("Invalid API key value: {e}").into(),
                    context: None,
                })?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .default_headers(headers);
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build()?;

        debug!(base_url = ?base_url.as_ref().map(Url::as_str), "Outbound HTTP client ready");

        Ok(HttpClient { inner: Arc::new(HttpClientInner { client, base_url }) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_the_base() {
        let client =
            HttpClient::builder().base_url("https://upstream.internal/api").init().unwrap();
        let url = client.resolve("v1/items").unwrap();
        assert_eq!(url.as_str(), "https://upstream.internal/api/v1/items");
    }

    #[test]
    fn absolute_urls_pass_through() {
        let client = HttpClient::builder().init().unwrap();
        let url = client.resolve("https://other.internal/x").unwrap();
        assert_eq!(url.as_str(), "https://other.internal/x");
    }

    #[test]
    fn relative_path_without_base_is_invalid() {
        let client = HttpClient::builder().init().unwrap();
        let err = client.resolve("v1/items").unwrap_err();
        assert!(matches!(err, HttpError::Validation { .. }));
    }

    #[test]
    fn malformed_base_url_fails_init() {
        let err = HttpClient::builder().base_url("not a url").init().unwrap_err();
        assert!(matches!(err, HttpError::Validation { .. }));
    }
}
