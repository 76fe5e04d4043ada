use std::time::Duration;

use thiserror::Error;

/// Terminal failure of one token acquisition. Each variant names the stage
/// that gave up.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("token binding {binding} was rejected by the store: {source}")]
    RequestRejected {
        binding: String,
        #[source]
        source: StoreError,
    },

    #[error("store unavailable while reading {kind} {name}: {source}")]
    StoreUnavailable {
        kind: &'static str,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("binding {binding} was not linked to an access token within {timeout:?}")]
    LinkTimeout { binding: String, timeout: Duration },

    #[error("access token {token} did not become ready within {timeout:?}")]
    TokenTimeout { token: String, timeout: Duration },

    #[error("access token {token} could not be read: {source}")]
    TokenLost {
        token: String,
        #[source]
        source: StoreError,
    },

    #[error("token secret {secret} does not exist")]
    SecretMissing { secret: String },

    #[error("token secret {secret} is not decodable: {message}")]
    Decode { secret: String, message: String },

    #[error("environment variable {name} holds no token")]
    MissingEnvToken { name: String },

    #[error("token acquisition cancelled")]
    Cancelled,
}

/// Errors reported by a [`crate::ResourceStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,

    #[error("resource already exists")]
    AlreadyExists,

    #[error("http status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Errors while setting up a connection to the resource store.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing environment variable {0}; not running inside a cluster?")]
    MissingEnv(&'static str),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid service account token")]
    InvalidToken,
}
