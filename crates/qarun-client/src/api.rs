//! The slice of the collaborator the run monitor depends on.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use qarun_core::RunId;

use crate::error::ClientError;
use crate::http::HttpClient;

/// What the user asked to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Natural-language intent, compiled and executed by the collaborator.
    Intent { nl: String },
    /// A TestIR produced earlier by `generate_scenario`.
    Scenario { test_ir: Value },
}

impl Submission {
    pub fn intent(nl: impl Into<String>) -> Self {
        Self::Intent { nl: nl.into() }
    }

    pub fn scenario(test_ir: Value) -> Self {
        Self::Scenario { test_ir }
    }
}

/// A run the collaborator accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedRun {
    pub run_id: RunId,
    /// Reply of a call that only returns once the run is over. Streamed runs
    /// have none.
    pub reply: Option<Value>,
}

impl CreatedRun {
    /// A run whose progress arrives over the event channel.
    pub fn streamed(run_id: RunId) -> Self {
        Self { run_id, reply: None }
    }
}

/// Run creation and result retrieval.
#[async_trait]
pub trait RunApi: Send + Sync + 'static {
    /// Start a run and return its identifier.
    async fn create_run(&self, submission: &Submission) -> Result<CreatedRun, ClientError>;

    /// Fetch the authoritative result payload of a finished run.
    async fn fetch_result(&self, run_id: &RunId) -> Result<Value, ClientError>;
}

#[async_trait]
impl RunApi for HttpClient {
    async fn create_run(&self, submission: &Submission) -> Result<CreatedRun, ClientError> {
        match submission {
            Submission::Intent { nl } => Ok(CreatedRun::streamed(self.submit(nl).await?)),
            Submission::Scenario { test_ir } => {
                let run_id = RunId::generate();
                let reply = self.run_scenario(&run_id, test_ir).await?;
                info!(run_id = %run_id, status = ?reply.get("status"), "Scenario run replied");
                Ok(CreatedRun {
                    run_id,
                    reply: Some(reply),
                })
            }
        }
    }

    async fn fetch_result(&self, run_id: &RunId) -> Result<Value, ClientError> {
        self.result(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    #[tokio::test]
    async fn test_scenario_submission_mints_run_id_and_keeps_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .respond_with(|req: &Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                ResponseTemplate::new(200).set_body_json(json!({
                    "task_id": body["run_id"],
                    "status": "failed",
                    "error": "selector not found"
                }))
            })
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri());
        let created = client
            .create_run(&Submission::scenario(json!({ "steps": [] })))
            .await
            .unwrap();
        assert!(created.run_id.as_str().starts_with("run_"));
        let reply = created.reply.unwrap();
        assert_eq!(reply["task_id"], created.run_id.as_str());
        assert_eq!(reply["status"], "failed");
    }

    #[tokio::test]
    async fn test_intent_submission_is_streamed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/submit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "run_id": "run_9" })))
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri());
        let created = client.create_run(&Submission::intent("open docs")).await.unwrap();
        assert_eq!(created, CreatedRun::streamed(RunId::new("run_9")));
    }
}
