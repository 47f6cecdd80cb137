//! RPC client for the ERP backend's `frappe.client.*` method surface
//!
//! Every call is a POST to `/api/method/<method>` with a JSON body; successful responses
//! wrap the result in `{"message": ...}`. Failures carry an `exc_type` that is mapped to a
//! typed `ErpError` variant instead of being matched by substring downstream.

use nexus_core::AppError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const SITE_HEADER: &str = "X-Frappe-Site-Name";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ErpError {
    #[error("ERP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("ERP rejected credentials: {0}")]
    Auth(String),

    /// The document changed since it was read.
    #[error("Document modified concurrently: {0}")]
    Conflict(String),

    #[error("ERP error {status} ({exc_type}): {message}")]
    Remote {
        status: u16,
        exc_type: String,
        message: String,
    },

    #[error("Unexpected ERP response: {0}")]
    Decode(String),
}

impl ErpError {
    /// Map a non-success response body onto a typed error.
    fn from_response(status: u16, body: &str) -> Self {
        let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
        let exc_type = parsed
            .get("exc_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let message = parsed
            .get("exception")
            .or_else(|| parsed.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.chars().take(300).collect());

        match (status, exc_type.as_str()) {
            (_, "DuplicateEntryError") | (_, "UniqueValidationError") | (409, _) => {
                ErpError::DuplicateEntry(message)
            }
            (_, "DoesNotExistError") | (404, _) => ErpError::NotFound(message),
            (_, "AuthenticationError") | (401, _) => ErpError::Auth(message),
            (_, "TimestampMismatchError") => ErpError::Conflict(message),
            _ => ErpError::Remote {
                status,
                exc_type,
                message,
            },
        }
    }
}

impl From<ErpError> for AppError {
    fn from(err: ErpError) -> Self {
        match err {
            ErpError::DuplicateEntry(msg) => AppError::AlreadyExists(msg),
            ErpError::NotFound(msg) => AppError::NotFound(msg),
            ErpError::Transport(e) => AppError::RegistryUnavailable(e.to_string()),
            ErpError::Remote {
                status,
                exc_type,
                message,
            } if status >= 500 => AppError::RegistryUnavailable(format!(
                "ERP error {} ({}): {}",
                status, exc_type, message
            )),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// How requests authenticate against a site.
#[derive(Clone)]
pub enum ErpAuth {
    /// `Authorization: token <key>:<secret>`
    Token { api_key: String, api_secret: String },
    /// Cookie session established by `login`.
    Session { user: String, password: String },
}

impl fmt::Debug for ErpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErpAuth::Token { api_key, .. } => f
                .debug_struct("Token")
                .field("api_key", api_key)
                .finish_non_exhaustive(),
            ErpAuth::Session { user, .. } => f
                .debug_struct("Session")
                .field("user", user)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ErpClient {
    http: reqwest::Client,
    base_url: String,
    site_name: Option<String>,
    auth: ErpAuth,
    session: Arc<RwLock<Option<String>>>,
}

impl ErpClient {
    pub fn new(
        base_url: impl Into<String>,
        site_name: Option<String>,
        auth: ErpAuth,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build ERP HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            site_name,
            auth,
            session: Arc::new(RwLock::new(None)),
        })
    }

    pub fn site_name(&self) -> Option<&str> {
        self.site_name.as_deref()
    }

    async fn headers(&self) -> Result<HeaderMap, ErpError> {
        let mut headers = HeaderMap::new();
        if let Some(site) = &self.site_name {
            let value = HeaderValue::from_str(site)
                .map_err(|e| ErpError::Decode(format!("Invalid site name header: {}", e)))?;
            headers.insert(SITE_HEADER, value);
        }
        match &self.auth {
            ErpAuth::Token {
                api_key,
                api_secret,
            } => {
                let value = HeaderValue::from_str(&format!("token {}:{}", api_key, api_secret))
                    .map_err(|e| ErpError::Decode(format!("Invalid token header: {}", e)))?;
                headers.insert(AUTHORIZATION, value);
            }
            ErpAuth::Session { .. } => {
                if let Some(sid) = self.session.read().await.as_deref() {
                    let value = HeaderValue::from_str(&format!("sid={}", sid))
                        .map_err(|e| ErpError::Decode(format!("Invalid session cookie: {}", e)))?;
                    headers.insert(COOKIE, value);
                }
            }
        }
        Ok(headers)
    }

    /// Establish a cookie session. No-op for token auth.
    #[tracing::instrument(skip(self), fields(site = ?self.site_name))]
    pub async fn login(&self) -> Result<(), ErpError> {
        let ErpAuth::Session { user, password } = &self.auth else {
            return Ok(());
        };

        let url = format!("{}/api/method/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.headers().await?)
            .json(&json!({ "usr": user, "pwd": password }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match ErpError::from_response(status.as_u16(), &body) {
                ErpError::Remote { message, .. } => ErpError::Auth(message),
                other => other,
            });
        }

        let sid = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|cookie| {
                cookie
                    .split(';')
                    .next()
                    .and_then(|pair| pair.trim().strip_prefix("sid="))
                    .map(str::to_string)
            })
            .ok_or_else(|| ErpError::Auth("Login response did not set a session".to_string()))?;

        *self.session.write().await = Some(sid);
        tracing::debug!("ERP session established");
        Ok(())
    }

    /// Invoke a whitelisted method and return its `message` payload.
    pub async fn call(&self, method: &str, body: Value) -> Result<Value, ErpError> {
        let url = format!("{}/api/method/{}", self.base_url, method);
        let response = self
            .http
            .post(&url)
            .headers(self.headers().await?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let err = ErpError::from_response(status.as_u16(), &text);
            tracing::debug!(method = %method, status = %status, error = %err, "ERP call failed");
            return Err(err);
        }

        let mut parsed: Value = serde_json::from_str(&text)
            .map_err(|e| ErpError::Decode(format!("{}: {}", method, e)))?;
        Ok(parsed
            .get_mut("message")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    pub async fn ping(&self) -> Result<(), ErpError> {
        match self.call("ping", json!({})).await? {
            Value::String(s) if s == "pong" => Ok(()),
            other => Err(ErpError::Decode(format!("Unexpected ping reply: {}", other))),
        }
    }

    /// `frappe.client.insert`. `doc` must carry its `doctype`.
    pub async fn insert(&self, doc: Value) -> Result<Value, ErpError> {
        self.call("frappe.client.insert", json!({ "doc": doc })).await
    }

    /// `frappe.client.save` of a full document as read. The backend refuses the write when
    /// `doc.modified` is older than the stored document, which makes this a compare-and-set.
    pub async fn save(&self, doc: Value) -> Result<Value, ErpError> {
        self.call("frappe.client.save", json!({ "doc": doc })).await
    }

    pub async fn get(&self, doctype: &str, name: &str) -> Result<Value, ErpError> {
        self.call(
            "frappe.client.get",
            json!({ "doctype": doctype, "name": name }),
        )
        .await
    }

    /// `get` that reports a missing document as `None`.
    pub async fn get_optional(&self, doctype: &str, name: &str) -> Result<Option<Value>, ErpError> {
        match self.get(doctype, name).await {
            Ok(Value::Null) => Ok(None),
            Ok(doc) => Ok(Some(doc)),
            Err(ErpError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_list(
        &self,
        doctype: &str,
        filters: Value,
        fields: &[&str],
        order_by: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Value>, ErpError> {
        let mut body = json!({
            "doctype": doctype,
            "filters": filters,
            "fields": fields,
            "limit_page_length": limit,
        });
        if let Some(order_by) = order_by {
            body["order_by"] = json!(order_by);
        }
        match self.call("frappe.client.get_list", body).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(ErpError::Decode(format!("get_list returned {}", other))),
        }
    }

    pub async fn get_count(&self, doctype: &str, filters: Value) -> Result<u64, ErpError> {
        let value = self
            .call(
                "frappe.client.get_count",
                json!({ "doctype": doctype, "filters": filters }),
            )
            .await?;
        value
            .as_u64()
            .ok_or_else(|| ErpError::Decode(format!("get_count returned {}", value)))
    }

    pub async fn set_value(
        &self,
        doctype: &str,
        name: &str,
        fieldname: &str,
        value: Value,
    ) -> Result<Value, ErpError> {
        self.call(
            "frappe.client.set_value",
            json!({ "doctype": doctype, "name": name, "fieldname": fieldname, "value": value }),
        )
        .await
    }

    /// Write several fields in one document save.
    pub async fn set_values(
        &self,
        doctype: &str,
        name: &str,
        fields: Value,
    ) -> Result<Value, ErpError> {
        self.call(
            "frappe.client.set_value",
            json!({ "doctype": doctype, "name": name, "fieldname": fields }),
        )
        .await
    }

    pub async fn delete(&self, doctype: &str, name: &str) -> Result<(), ErpError> {
        self.call(
            "frappe.client.delete",
            json!({ "doctype": doctype, "name": name }),
        )
        .await?;
        Ok(())
    }

    pub async fn submit(&self, doc: Value) -> Result<Value, ErpError> {
        self.call("frappe.client.submit", json!({ "doc": doc })).await
    }

    pub async fn cancel(&self, doctype: &str, name: &str) -> Result<(), ErpError> {
        self.call(
            "frappe.client.cancel",
            json!({ "doctype": doctype, "name": name }),
        )
        .await?;
        Ok(())
    }
}
