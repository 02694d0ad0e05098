//! HTTP client for the control API.
//!
//! This module provides the `ControlApi` trait the reconcile loop talks
//! through and a reqwest-backed implementation of it.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};

use corral_core::Name;

use crate::config::AgentConfig;
use crate::types::{ApiErrorResponse, ContainerReport, HostFacts, Registration, RemoteHost};

/// Prefix of every control API route.
pub const API_PREFIX: &str = "/api/v1";

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Failed to parse response.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

impl ClientError {
    /// Returns true for network failures and server-side errors that the
    /// next cycle may not hit again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Parse(_) => false,
        }
    }

    /// Returns true if the API answered with `status`.
    #[must_use]
    pub fn is_status(&self, status: StatusCode) -> bool {
        matches!(self, Self::Api { status: s, .. } if *s == status.as_u16())
    }
}

/// The control API operations the agent needs.
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// Fetch this host with its containers. Also records a heartbeat.
    async fn fetch_host(&self) -> Result<RemoteHost, ClientError>;

    /// Register this host.
    async fn register_host(&self, registration: &Registration) -> Result<(), ClientError>;

    /// Push updated host facts.
    async fn update_host(&self, facts: &HostFacts) -> Result<(), ClientError>;

    /// Report a container's observed state.
    async fn update_container(
        &self,
        container: &Name,
        report: &ContainerReport,
    ) -> Result<(), ClientError>;

    /// Ask the control plane to delete a finished one-shot container.
    async fn request_destroy(&self, container: &Name) -> Result<(), ClientError>;

    /// Append raw output to a container log.
    async fn append_log(&self, container: &Name, log: &str, data: Vec<u8>)
        -> Result<(), ClientError>;

    /// Download the current agent binary.
    async fn download_agent(&self) -> Result<Vec<u8>, ClientError>;
}

/// Client for the control API, authenticating as one host.
#[derive(Debug, Clone)]
pub struct HttpControlClient {
    client: Client,
    base_url: String,
    host: Name,
    token: HeaderValue,
}

impl HttpControlClient {
    /// Create a client from the agent configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Parse` if the API key cannot be sent as a header
    /// and `ClientError::Http` if the HTTP client cannot be built.
    pub fn new(config: &AgentConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let mut token = HeaderValue::from_str(&format!("Token {}", config.api_key))
            .map_err(|e| ClientError::Parse(format!("api key: {e}")))?;
        token.set_sensitive(true);

        Ok(Self {
            client,
            base_url: format!("{}{API_PREFIX}", config.server_url.trim_end_matches('/')),
            host: config.host_name.clone(),
            token,
        })
    }

    fn host_url(&self) -> String {
        format!("{}/host/{}/", self.base_url, self.host)
    }

    fn container_url(&self, container: &Name) -> String {
        format!("{}container/{container}/", self.host_url())
    }

    /// Build headers for authenticated requests.
    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.token.clone());
        headers
    }

    /// Handle API error responses.
    async fn handle_error(response: Response) -> ClientError {
        let status = response.status().as_u16();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(err) => err.error.message,
            Err(_) => "unknown error".to_string(),
        };
        ClientError::Api { status, message }
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::handle_error(response).await)
        }
    }
}

#[async_trait]
impl ControlApi for HttpControlClient {
    async fn fetch_host(&self) -> Result<RemoteHost, ClientError> {
        let response = self
            .client
            .get(format!("{}?with_containers", self.host_url()))
            .headers(self.auth_headers())
            .send()
            .await?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn register_host(&self, registration: &Registration) -> Result<(), ClientError> {
        let response = self
            .client
            .post(format!("{}/host/", self.base_url))
            .json(registration)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update_host(&self, facts: &HostFacts) -> Result<(), ClientError> {
        let response = self
            .client
            .patch(self.host_url())
            .headers(self.auth_headers())
            .json(facts)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update_container(
        &self,
        container: &Name,
        report: &ContainerReport,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .patch(self.container_url(container))
            .headers(self.auth_headers())
            .json(report)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn request_destroy(&self, container: &Name) -> Result<(), ClientError> {
        let response = self
            .client
            .patch(self.container_url(container))
            .headers(self.auth_headers())
            .json(&serde_json::json!({ "state": "DESTROY" }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn append_log(
        &self,
        container: &Name,
        log: &str,
        data: Vec<u8>,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .post(format!("{}logs/{log}", self.container_url(container)))
            .headers(self.auth_headers())
            .header(CONTENT_TYPE, "text/plain")
            .body(data)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn download_agent(&self) -> Result<Vec<u8>, ClientError> {
        let response = self
            .client
            .get(format!("{}/agent/download", self.base_url))
            .send()
            .await?;
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
