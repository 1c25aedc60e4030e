//! Vault HTTP client (reqwest-based).
//!
//! Wraps the vault query API (VQL over `POST /query` with cursor-based
//! continuation pages), the authentication endpoint, and JSON mutation
//! calls.  Retry policy deliberately lives outside this client: a failed
//! page fails the whole query, and the orchestrator decides whether the
//! run is worth repeating.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};

/// Error object carried in a vault response body.
#[derive(Debug, Deserialize)]
pub struct VaultApiError {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// Pagination details of a query response.
#[derive(Debug, Default, Deserialize)]
pub struct ResponseDetails {
    /// Relative URL of the next page, absent on the last page.
    #[serde(default)]
    pub next_page: Option<String>,
}

/// One page of a VQL query response.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default, rename = "responseDetails")]
    pub response_details: ResponseDetails,
    #[serde(default)]
    pub errors: Vec<VaultApiError>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// HTTP client for one vault, bound to a session token for the duration of
/// a run.
#[derive(Debug, Clone)]
pub struct VaultClient {
    base_url: String,
    api_version: String,
    http_client: Client,
    session_id: String,
}

impl VaultClient {
    /// Create a client from configuration and a loaded session token.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &VaultConfig, session_id: String) -> VaultResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("trialsync/0.1")
            .build()
            .map_err(|e| VaultError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_http_client(
            config.base_url.clone(),
            config.api_version.clone(),
            http_client,
            session_id,
        ))
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(
        base_url: String,
        api_version: String,
        http_client: Client,
        session_id: String,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version,
            http_client,
            session_id,
        }
    }

    /// Base URL of the vault.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn query_url(&self) -> String {
        format!("{}/api/{}/query", self.base_url, self.api_version)
    }

    /// Run a VQL query and materialize the complete result set.
    ///
    /// The initial query is issued as a `POST`; every subsequent page is
    /// fetched via the continuation URL from the previous response, never by
    /// re-issuing the query text.  Record order is preserved exactly as
    /// returned by the vault.
    ///
    /// # Errors
    ///
    /// [`VaultError::SessionExpired`] when any page signals
    /// `INVALID_SESSION_ID` (accumulated pages are discarded);
    /// [`VaultError::Api`] for other non-2xx responses;
    /// [`VaultError::Query`] when a 2xx response carries error objects.
    pub async fn query(&self, vql: &str) -> VaultResult<Vec<serde_json::Value>> {
        let mut records = Vec::new();
        let mut next_page: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let response = match &next_page {
                None => {
                    debug!(url = %self.query_url(), "VQL POST");
                    self.http_client
                        .post(self.query_url())
                        .header("Accept", "application/json")
                        .header("X-VaultAPI-DescribeQuery", "true")
                        .bearer_auth(&self.session_id)
                        .form(&[("q", vql)])
                        .send()
                        .await?
                }
                Some(page) => {
                    let url = format!("{}{}", self.base_url, page);
                    debug!(%url, "VQL page GET");
                    self.http_client
                        .get(&url)
                        .header("Accept", "application/json")
                        .bearer_auth(&self.session_id)
                        .send()
                        .await?
                }
            };

            let page = self.handle_query_response(response).await?;
            pages += 1;
            records.extend(page.data);

            match page.response_details.next_page {
                Some(next) => next_page = Some(next),
                None => break,
            }
        }

        debug!(records = records.len(), pages, "query complete");
        Ok(records)
    }

    /// Issue a JSON mutation request against an application endpoint,
    /// e.g. `app/cdm/users_json`.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> VaultResult<T> {
        let url = format!("{}/api/{}/{}", self.base_url, self.api_version, path);
        debug!(%url, "vault POST");
        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .bearer_auth(&self.session_id)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }
        Err(Self::error_from_body(status, text))
    }

    /// Issue a JSON read against an application endpoint with query
    /// parameters, e.g. `app/cdm/design/study_masters`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> VaultResult<T> {
        let url = format!("{}/api/{}/{}", self.base_url, self.api_version, path);
        debug!(%url, "vault GET");
        let response = self
            .http_client
            .get(&url)
            .query(params)
            .header("Accept", "application/json")
            .bearer_auth(&self.session_id)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }
        Err(Self::error_from_body(status, text))
    }

    /// Authenticate against the vault and return a fresh session token.
    ///
    /// This is the out-of-band credential acquisition step; the sync core
    /// never calls it mid-run.
    pub async fn authenticate(
        config: &VaultConfig,
        username: &str,
        password: &str,
    ) -> VaultResult<String> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| VaultError::Config(format!("failed to build HTTP client: {e}")))?;

        let url = format!("{}/api/{}/auth", config.base_url, config.api_version);
        let response = http_client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Self::error_from_body(status, text));
        }

        let parsed: AuthResponse = serde_json::from_str(&text)?;
        parsed
            .session_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| VaultError::Session("no sessionId in auth response".into()))
    }

    async fn handle_query_response(
        &self,
        response: reqwest::Response,
    ) -> VaultResult<QueryResponse> {
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(Self::error_from_body(status, text));
        }
        if !status.is_success() {
            return Err(VaultError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: QueryResponse = serde_json::from_str(&text)?;
        if !parsed.errors.is_empty() {
            if parsed.errors.iter().any(|e| e.kind == "INVALID_SESSION_ID") {
                return Err(VaultError::SessionExpired);
            }
            let detail = parsed
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.kind, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(VaultError::Query(detail));
        }
        Ok(parsed)
    }

    /// Classify a non-success response body, distinguishing the expired
    /// session signal from generic API errors.
    fn error_from_body(status: StatusCode, body: String) -> VaultError {
        if let Ok(parsed) = serde_json::from_str::<QueryResponse>(&body) {
            if parsed.errors.iter().any(|e| e.kind == "INVALID_SESSION_ID") {
                return VaultError::SessionExpired;
            }
        }
        VaultError::Api {
            status: status.as_u16(),
            body,
        }
    }
}
