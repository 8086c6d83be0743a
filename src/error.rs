// Error types module

use thiserror::Error;

/// Configuration errors raised while building routes and sources.
///
/// Fatal for the route being registered only: the route is skipped and the
/// remaining routes keep serving.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("source '{0}' not registered")]
    UnknownSource(String),

    #[error("config for source '{source_name}' is not valid for {expected}: {message}")]
    InvalidSourceConfig {
        source_name: String,
        expected: &'static str,
        message: String,
    },

    #[error("invalid rewrite pattern '{pattern}': {message}")]
    InvalidRewrite { pattern: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("{0}")]
    Invalid(String),
}

/// Failures of an external renderer invocation.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("renderer command is empty")]
    EmptyCommand,

    #[error("failed to stage input file: {0}")]
    Stage(#[source] std::io::Error),

    #[error("failed to spawn renderer: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("renderer timed out after {0}s")]
    Timeout(u64),

    #[error("failed to read rendered output '{path}': {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures fetching raw bytes from an image source.
#[derive(Error, Debug)]
pub enum SourceFetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("{0} error while making request")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("invalid logical path '{0}'")]
    InvalidPath(String),

    #[error("failed to render preview: {0}")]
    Render(#[from] RenderError),
}

impl SourceFetchError {
    /// Upstream status code, when the failure was a non-success response
    pub fn status(&self) -> Option<u16> {
        match self {
            SourceFetchError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SourceFetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceFetchError::Timeout
        } else {
            SourceFetchError::Request(err.to_string())
        }
    }
}
