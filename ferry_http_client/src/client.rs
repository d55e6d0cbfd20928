use crate::error::{HttpClientError, Result};
use async_trait::async_trait;
use ferry_common::transport::{ArtifactTransport, TransportError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Path template for the natively exposed files endpoint.
pub const FILES_ENDPOINT_PATH: &str = "/files/{artifact_id}/content";
/// Path template for the sandbox container endpoint.
pub const CONTAINER_ENDPOINT_PATH: &str = "/containers/{session_id}/files/{artifact_id}/content";

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Retrieves artifacts with a bearer-authenticated `GET` against a templated URL.
pub struct HttpArtifactTransport {
    name: String,
    client: reqwest::Client,
    base_url: String,
    path_template: String,
    bearer_token: String,
}

impl std::fmt::Debug for HttpArtifactTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpArtifactTransport")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("path_template", &self.path_template)
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

impl HttpArtifactTransport {
    /// Build a transport.
    ///
    /// `path_template` is appended to `base_url` after substituting
    /// `{session_id}` and `{artifact_id}`. `request_timeout` bounds every
    /// individual request.
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        path_template: &str,
        bearer_token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let parsed = Url::parse(base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(HttpClientError::UnsupportedScheme(
                parsed.scheme().to_string(),
            ));
        }
        if !path_template.contains("{artifact_id}") {
            return Err(HttpClientError::MissingPlaceholder(
                path_template.to_string(),
            ));
        }
        let bearer_token = bearer_token.into();
        if bearer_token.trim().is_empty() {
            return Err(HttpClientError::MissingCredential);
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            name: name.into(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            path_template: path_template.to_string(),
            bearer_token,
        })
    }

    /// Transport for the natively exposed files endpoint (primary tier).
    pub fn files_endpoint(
        base_url: &str,
        bearer_token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        Self::new(
            "files-endpoint",
            base_url,
            FILES_ENDPOINT_PATH,
            bearer_token,
            request_timeout,
        )
    }

    /// Transport for the sandbox container endpoint (fallback tier).
    pub fn container_endpoint(
        base_url: &str,
        bearer_token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        Self::new(
            "container-endpoint",
            base_url,
            CONTAINER_ENDPOINT_PATH,
            bearer_token,
            request_timeout,
        )
    }

    /// Build the request URL for one artifact.
    pub fn artifact_url(
        &self,
        session_id: &str,
        artifact_id: &str,
    ) -> std::result::Result<Url, TransportError> {
        check_identifier("artifact", artifact_id)?;
        if self.path_template.contains("{session_id}") {
            check_identifier("session", session_id)?;
        }

        let path = self
            .path_template
            .replace("{session_id}", session_id)
            .replace("{artifact_id}", artifact_id);
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };

        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| TransportError::InvalidRequest(format!("cannot build URL: {e}")))
    }
}

#[async_trait]
impl ArtifactTransport for HttpArtifactTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        session_id: &str,
        artifact_id: &str,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let url = self.artifact_url(session_id, artifact_id)?;
        debug!(transport = %self.name, %url, "requesting artifact");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await.map_err(map_request_error)?;
            debug!(transport = %self.name, bytes = bytes.len(), "artifact received");
            return Ok(bytes.to_vec());
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        let error = classify_status(status.as_u16(), retry_after, &body);
        debug!(transport = %self.name, status = status.as_u16(), %error, "artifact request failed");
        Err(error)
    }
}

/// Map a non-success HTTP status onto the transport error taxonomy.
pub fn classify_status(status: u16, retry_after: Option<Duration>, body: &str) -> TransportError {
    match status {
        404 | 410 => TransportError::NotFound,
        429 => TransportError::RateLimited { retry_after },
        400 | 405 | 415 | 501 => TransportError::Unsupported {
            reason: format!("HTTP {status}: {}", truncate(body)),
        },
        408 | 500..=599 => TransportError::Server { status },
        _ => TransportError::Rejected {
            status,
            message: truncate(body),
        },
    }
}

fn map_request_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(error.to_string())
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Identifiers are substituted into a URL path verbatim, so reject anything
/// that would change the path structure.
fn check_identifier(kind: &str, value: &str) -> std::result::Result<(), TransportError> {
    if value.is_empty() {
        return Err(TransportError::InvalidRequest(format!(
            "{kind} identifier is empty"
        )));
    }
    if value
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
        || value == "."
        || value == ".."
    {
        return Err(TransportError::InvalidRequest(format!(
            "{kind} identifier '{value}' cannot be used in a URL path"
        )));
    }
    Ok(())
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{cut}...")
    }
}
