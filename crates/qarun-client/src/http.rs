//! HTTP client for the collaborator's REST endpoints.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use qarun_core::{Report, RunId, TaskSummary};

use crate::error::ClientError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout of `POST /run`, which only answers once the run finished.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// Default prefix of the run endpoints (`/api/submit`, `/api/result/{id}`).
pub const DEFAULT_API_PREFIX: &str = "/api";

#[derive(Deserialize)]
struct SubmitResponse {
    run_id: RunId,
}

#[derive(Serialize)]
struct RunScenarioRequest<'a> {
    run_id: &'a RunId,
    test_ir: &'a Value,
}

/// HTTP client for the collaborator REST API.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
    api_prefix: String,
    run_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with the default timeout and API prefix.
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a new HTTP client with a custom request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            run_timeout: DEFAULT_RUN_TIMEOUT.max(timeout),
        }
    }

    /// Override the prefix used for the submit/result/status endpoints.
    pub fn api_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_end_matches('/');
        self.api_prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        self
    }

    /// Override the timeout of the blocking scenario run call.
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a natural-language test intent. Returns the assigned run id.
    pub async fn submit(&self, nl: &str) -> Result<RunId, ClientError> {
        let path = format!("{}/submit", self.api_prefix);
        let response: SubmitResponse = self.post_json(&path, &json!({ "nl": nl })).await?;
        Ok(response.run_id)
    }

    /// Fetch the authoritative result of a run. Opaque to the client.
    pub async fn result(&self, run_id: &RunId) -> Result<Value, ClientError> {
        self.get_json(&format!("{}/result/{}", self.api_prefix, run_id.path_segment()))
            .await
    }

    /// Fetch the collaborator's status record for a run.
    pub async fn status(&self, run_id: &RunId) -> Result<Value, ClientError> {
        self.get_json(&format!("{}/status/{}", self.api_prefix, run_id.path_segment()))
            .await
    }

    /// First phase of the two-phase flow: compile an intent into a TestIR.
    pub async fn generate_scenario(&self, nl: &str, target_url: &str) -> Result<Value, ClientError> {
        self.post_json(
            "/generate_scenario",
            &json!({ "nl": nl, "target_url": target_url }),
        )
        .await
    }

    /// Second phase of the two-phase flow: execute a TestIR under `run_id`.
    ///
    /// The collaborator answers once the run is over, with its verdict
    /// (`status: completed|failed`), so this uses the run timeout.
    pub async fn run_scenario(&self, run_id: &RunId, test_ir: &Value) -> Result<Value, ClientError> {
        let request = self
            .inner
            .post(format!("{}/run", self.base_url))
            .timeout(self.run_timeout)
            .json(&RunScenarioRequest { run_id, test_ir });
        debug!(run_id = %run_id, timeout = ?self.run_timeout, "POST /run");

        let response = request.send().await.map_err(Self::transport)?;
        Self::decode(response, "/run").await
    }

    /// Fetch the aggregate report.
    pub async fn report(&self) -> Result<Report, ClientError> {
        self.get_json("/report").await
    }

    /// Fetch the full task list snapshot.
    pub async fn tasks(&self) -> Result<Vec<TaskSummary>, ClientError> {
        self.get_json("/tasks").await
    }

    /// Get JSON from an endpoint.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET request");

        let response = self.inner.get(&url).send().await.map_err(Self::transport)?;
        Self::decode(response, path).await
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST request");

        let response = self
            .inner
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::decode(response, path).await
    }

    fn transport(e: reqwest::Error) -> ClientError {
        if e.is_connect() {
            ClientError::Connection(e.to_string())
        } else {
            ClientError::Http(e)
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> Result<T, ClientError> {
        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                path: path.to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }
}
