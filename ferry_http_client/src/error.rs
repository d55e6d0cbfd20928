use thiserror::Error;

/// Errors raised while building an [`crate::client::HttpArtifactTransport`].
#[derive(Error, Debug)]
pub enum HttpClientError {
    #[error("HTTP client construction failed: {0}")]
    Build(#[from] reqwest::Error),
    #[error("Base URL is invalid: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Base URL must use http or https, got '{0}'")]
    UnsupportedScheme(String),
    #[error("Path template '{0}' must contain the {{artifact_id}} placeholder")]
    MissingPlaceholder(String),
    #[error("Bearer credential is empty")]
    MissingCredential,
}

pub type Result<T> = std::result::Result<T, HttpClientError>;
