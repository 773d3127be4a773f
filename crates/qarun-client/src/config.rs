//! Client configuration shared by the TUI and CLI front ends.

use std::time::Duration;

use qarun_core::CollaboratorEndpoint;

use crate::error::ClientError;
use crate::http::{HttpClient, DEFAULT_API_PREFIX, DEFAULT_RUN_TIMEOUT, DEFAULT_TIMEOUT};
use crate::monitor::{MonitorConfig, DEFAULT_DISCONNECT_GRACE};

pub const DEFAULT_PAGE_ORIGIN: &str = "http://localhost";
pub const DEFAULT_COLLABORATOR_PORT: u16 = 8000;
pub const DEFAULT_TASK_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REPORT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin the client is served from. Its scheme and host decide where the
    /// collaborator lives.
    pub page_origin: String,
    /// Port the collaborator listens on, on the page origin's host.
    pub collaborator_port: u16,
    /// Explicit base URL for REST calls. Defaults to the collaborator origin.
    pub api_base: Option<String>,
    /// Prefix of the submit/result/status endpoints.
    pub api_prefix: String,
    pub task_poll_interval: Duration,
    pub report_poll_interval: Duration,
    pub disconnect_grace: Duration,
    pub request_timeout: Duration,
    /// Timeout of the blocking scenario run call.
    pub run_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_origin: DEFAULT_PAGE_ORIGIN.to_string(),
            collaborator_port: DEFAULT_COLLABORATOR_PORT,
            api_base: None,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            task_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            report_poll_interval: DEFAULT_REPORT_POLL_INTERVAL,
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
            request_timeout: DEFAULT_TIMEOUT,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Where the collaborator lives, derived from the page origin.
    pub fn endpoint(&self) -> Result<CollaboratorEndpoint, ClientError> {
        Ok(CollaboratorEndpoint::from_page_origin(
            &self.page_origin,
            self.collaborator_port,
        )?)
    }

    /// Base URL for REST calls.
    pub fn http_base(&self) -> Result<String, ClientError> {
        match &self.api_base {
            Some(base) if !base.trim().is_empty() => Ok(base.trim().to_string()),
            _ => Ok(self.endpoint()?.http_origin()),
        }
    }

    pub fn http_client(&self) -> Result<HttpClient, ClientError> {
        Ok(HttpClient::with_timeout(&self.http_base()?, self.request_timeout)
            .api_prefix(&self.api_prefix)
            .run_timeout(self.run_timeout))
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            disconnect_grace: self.disconnect_grace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets_localhost_8000() {
        let config = ClientConfig::default();
        assert_eq!(config.http_base().unwrap(), "http://localhost:8000");
        assert_eq!(config.monitor_config().disconnect_grace, Duration::from_secs(15));
    }

    #[test]
    fn test_explicit_api_base_wins() {
        let config = ClientConfig {
            api_base: Some("http://api.internal:9000/".to_string()),
            ..Default::default()
        };
        let client = config.http_client().unwrap();
        assert_eq!(client.base_url(), "http://api.internal:9000");
    }

    #[test]
    fn test_secure_origin() {
        let config = ClientConfig {
            page_origin: "https://demo.example".to_string(),
            ..Default::default()
        };
        let endpoint = config.endpoint().unwrap();
        assert_eq!(
            endpoint.channel_url(&qarun_core::RunId::new("run_1")),
            "wss://demo.example:8000/ws/run_1"
        );
        assert_eq!(config.http_base().unwrap(), "https://demo.example:8000");
    }

    #[test]
    fn test_invalid_origin_is_config_error() {
        let config = ClientConfig {
            page_origin: "ftp://files.example".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.endpoint(), Err(ClientError::Config(_))));
    }
}
