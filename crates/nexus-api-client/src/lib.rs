//! HTTP client for the Nexus provisioning API.
//!
//! Every request carries the `X-Provisioning-Secret` header. Non-2xx answers become an
//! [`ApiError`] (inside `anyhow::Error`) carrying the server's error code, so callers can
//! `downcast_ref::<ApiError>()` to branch on it.

pub mod api;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const SECRET_HEADER: &str = "X-Provisioning-Secret";

/// Synchronous provisioning can hold a request for minutes.
const REQUEST_TIMEOUT_SECS: u64 = 900;

/// Error body returned by the API for any non-2xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    pub error: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub recoverable: bool,
    #[serde(default)]
    pub suggested_action: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API request failed with status {}: {}", self.status, self.error)?;
        if let Some(action) = &self.suggested_action {
            write!(f, " ({})", action)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    secret: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        })
    }

    /// Create client from environment: NEXUS_API_URL (or PROVISIONING_API_URL) and
    /// PROVISIONING_API_SECRET.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("NEXUS_API_URL")
            .or_else(|_| std::env::var("PROVISIONING_API_URL"))
            .unwrap_or_else(|_| "http://localhost:8001".to_string());

        let secret = std::env::var("PROVISIONING_API_SECRET")
            .context("Missing provisioning secret. Set PROVISIONING_API_SECRET")?;

        Self::new(base_url, secret)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(SECRET_HEADER, self.secret.as_str())
    }

    /// Send and return the raw response; only transport failures are errors here.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorized(request)
            .send()
            .await
            .context("Failed to send request")
    }

    pub(crate) async fn error_from(response: Response) -> anyhow::Error {
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        match serde_json::from_str::<ApiError>(&text) {
            Ok(mut error) => {
                error.status = status.as_u16();
                error.into()
            }
            Err(_) => ApiError {
                status: status.as_u16(),
                error: text,
                code: String::new(),
                recoverable: status.is_server_error(),
                suggested_action: None,
            }
            .into(),
        }
    }

    pub(crate) async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json()
            .await
            .context("Failed to parse response as JSON")
    }

    /// GET with query parameters; any non-2xx is an error.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut request = self.client.get(self.build_url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Self::parse(response).await
    }

    /// POST a JSON body; any status other than 200 is an error.
    pub async fn post_json<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .send(self.client.post(self.build_url(path)).json(body))
            .await?;
        if response.status() != StatusCode::OK {
            return Err(Self::error_from(response).await);
        }
        Self::parse(response).await
    }

    /// Raw client for custom requests. Use `build_url`; the secret header is not applied.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

pub use api::{
    DegradedResult, ProvisionAccepted, ProvisionOutcome, RotatedCredentials, RotationOutcome,
};
pub use nexus_core::models::{
    ProvisionRequest, ProvisionedTenant, ResolvedTenant, StatusReport, SubdomainAvailability,
    Tenant, TenantStatus, UpdateCredentialsRequest, UpdateCredentialsResponse,
};
