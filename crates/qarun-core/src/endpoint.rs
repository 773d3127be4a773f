//! Split-origin addressing for the collaborator.
//!
//! The client may be served from one origin while the collaborator listens on
//! the same host under a different, independently configured port. Every
//! collaborator-relative path (channel address, artifact images) goes through
//! [`resolve_collaborator_url`] so the scheme/host/port logic lives in one place.

use url::Url;

use crate::error::CoreError;
use crate::ids::RunId;

/// Which protocol family a resolved URL is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// `http` / `https`
    Http,
    /// `ws` / `wss`
    WebSocket,
}

/// Where the collaborator lives: scheme security, host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorEndpoint {
    secure: bool,
    host: String,
    port: u16,
}

impl CollaboratorEndpoint {
    /// Build an endpoint from explicit parts.
    pub fn new(secure: bool, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        // Bare IPv6 literals need brackets inside a URL authority.
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host
        };
        Self { secure, host, port }
    }

    /// Derive the endpoint from the page's own origin, keeping its scheme
    /// security and host but substituting the collaborator port.
    ///
    /// ```
    /// use qarun_core::CollaboratorEndpoint;
    ///
    /// let ep = CollaboratorEndpoint::from_page_origin("https://demo.example", 8000).unwrap();
    /// assert_eq!(ep.http_origin(), "https://demo.example:8000");
    /// ```
    pub fn from_page_origin(origin: &str, port: u16) -> Result<Self, CoreError> {
        let url = Url::parse(origin)
            .map_err(|e| CoreError::InvalidOrigin(format!("{}: {}", origin, e)))?;
        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(CoreError::InvalidOrigin(format!(
                    "unsupported scheme '{}' in {}",
                    other, origin
                )))
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| CoreError::InvalidOrigin(format!("no host in {}", origin)))?;
        Ok(Self::new(secure, host, port))
    }

    /// `http(s)://host:port`, always with an explicit port.
    pub fn http_origin(&self) -> String {
        resolve_collaborator_url(self, Transport::Http, "")
    }

    /// Realtime channel address for a run: `ws(s)://host:port/ws/{run_id}`.
    pub fn channel_url(&self, run_id: &RunId) -> String {
        let path = format!("/ws/{}", run_id.path_segment());
        resolve_collaborator_url(self, Transport::WebSocket, &path)
    }

    /// Resolve an artifact path (e.g. `/artifacts/run1/1.png`) to an absolute URL.
    pub fn artifact_url(&self, path: &str) -> String {
        resolve_collaborator_url(self, Transport::Http, path)
    }
}

/// Resolve a collaborator-relative path against the collaborator's origin.
///
/// Paths that are already absolute `http(s)`/`ws(s)` URLs are returned as-is.
/// A missing leading slash is added.
pub fn resolve_collaborator_url(
    endpoint: &CollaboratorEndpoint,
    transport: Transport,
    path: &str,
) -> String {
    let lower = path.to_ascii_lowercase();
    if ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
    {
        return path.to_owned();
    }

    let scheme = match (transport, endpoint.secure) {
        (Transport::Http, false) => "http",
        (Transport::Http, true) => "https",
        (Transport::WebSocket, false) => "ws",
        (Transport::WebSocket, true) => "wss",
    };
    let separator = if path.is_empty() || path.starts_with('/') {
        ""
    } else {
        "/"
    };
    format!(
        "{}://{}:{}{}{}",
        scheme, endpoint.host, endpoint.port, separator, path
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_resolves_against_collaborator_port() {
        let ep = CollaboratorEndpoint::from_page_origin("https://demo.example", 8000).unwrap();
        assert_eq!(
            ep.artifact_url("/artifacts/run1/1.png"),
            "https://demo.example:8000/artifacts/run1/1.png"
        );
    }

    #[test]
    fn test_page_port_is_replaced() {
        let ep = CollaboratorEndpoint::from_page_origin("http://localhost:5173/app", 8000).unwrap();
        assert_eq!(ep.http_origin(), "http://localhost:8000");
    }

    #[test]
    fn test_default_port_stays_explicit() {
        let ep = CollaboratorEndpoint::new(true, "demo.example", 443);
        assert_eq!(ep.http_origin(), "https://demo.example:443");
    }

    #[test]
    fn test_channel_url_upgrades_scheme() {
        let run = RunId::new("run_1");
        let plain = CollaboratorEndpoint::from_page_origin("http://demo.example", 8000).unwrap();
        assert_eq!(plain.channel_url(&run), "ws://demo.example:8000/ws/run_1");

        let secure = CollaboratorEndpoint::from_page_origin("https://demo.example", 8000).unwrap();
        assert_eq!(secure.channel_url(&run), "wss://demo.example:8000/ws/run_1");
    }

    #[test]
    fn test_channel_url_encodes_run_id() {
        let ep = CollaboratorEndpoint::new(false, "localhost", 8000);
        assert_eq!(
            ep.channel_url(&RunId::new("../admin?x=1")),
            "ws://localhost:8000/ws/..%2Fadmin%3Fx%3D1"
        );
    }

    #[test]
    fn test_absolute_urls_pass_through() {
        let ep = CollaboratorEndpoint::new(false, "localhost", 8000);
        assert_eq!(
            ep.artifact_url("https://cdn.example/a.png"),
            "https://cdn.example/a.png"
        );
    }

    #[test]
    fn test_missing_leading_slash() {
        let ep = CollaboratorEndpoint::new(false, "localhost", 8000);
        assert_eq!(ep.artifact_url("artifacts/x.png"), "http://localhost:8000/artifacts/x.png");
    }

    #[test]
    fn test_ipv6_host() {
        let ep = CollaboratorEndpoint::new(false, "::1", 8000);
        assert_eq!(ep.http_origin(), "http://[::1]:8000");

        let ep = CollaboratorEndpoint::from_page_origin("http://[::1]:3000", 8000).unwrap();
        assert_eq!(ep.http_origin(), "http://[::1]:8000");
    }

    #[test]
    fn test_invalid_origins() {
        assert!(CollaboratorEndpoint::from_page_origin("demo.example", 8000).is_err());
        assert!(CollaboratorEndpoint::from_page_origin("ftp://demo.example", 8000).is_err());
    }
}
