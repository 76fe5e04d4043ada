use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    AuthorizationHeader, FetchError, LoginCallback, ResourceStore, SpiTokenFetcher, TokenRequest,
};

pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Anything that can produce an `Authorization` header for a repository.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn build_header(
        &self,
        repo_url: &str,
        on_login: Option<LoginCallback>,
        cancel: CancellationToken,
    ) -> Result<AuthorizationHeader, FetchError>;
}

#[async_trait]
impl<S: ResourceStore> TokenSource for SpiTokenFetcher<S> {
    async fn build_header(
        &self,
        repo_url: &str,
        on_login: Option<LoginCallback>,
        cancel: CancellationToken,
    ) -> Result<AuthorizationHeader, FetchError> {
        let mut request = TokenRequest::new(repo_url);
        request.on_login = on_login;
        self.acquire_token_with_cancel(request, cancel).await
    }
}

/// Reads a ready-made token from an environment variable. Never needs a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvTokenSource {
    variable: String,
}

impl EnvTokenSource {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    fn header_from(&self, value: Option<String>) -> Result<AuthorizationHeader, FetchError> {
        match value.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(AuthorizationHeader::bearer(token)),
            _ => Err(FetchError::MissingEnvToken {
                name: self.variable.clone(),
            }),
        }
    }
}

impl Default for EnvTokenSource {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_ENV)
    }
}

#[async_trait]
impl TokenSource for EnvTokenSource {
    async fn build_header(
        &self,
        repo_url: &str,
        _on_login: Option<LoginCallback>,
        _cancel: CancellationToken,
    ) -> Result<AuthorizationHeader, FetchError> {
        debug!(repo_url = %repo_url, variable = %self.variable, "reading token from environment");
        self.header_from(std::env::var(&self.variable).ok())
    }
}
