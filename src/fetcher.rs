use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::naming;
use crate::poll::{PollError, poll_until};
use crate::{
    AccessTokenStatus, AuthorizationHeader, BindingSpec, FetchError, FetcherConfig, ObjectMeta,
    Permissions, ResourceStore, SECRET_PASSWORD_KEY, Secret, SecretSpec, SpiAccessToken,
    SpiAccessTokenBinding, StoreError, TokenPhase,
};

/// Called with the login URL when the token needs interactive authorization.
pub type LoginCallback = Box<dyn FnOnce(String) + Send + 'static>;

/// One token acquisition: the repository, the access it needs, and an
/// optional hook that drives the interactive login.
pub struct TokenRequest {
    pub(crate) repo_url: String,
    pub(crate) permissions: Option<Permissions>,
    pub(crate) on_login: Option<LoginCallback>,
}

impl TokenRequest {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            permissions: None,
            on_login: None,
        }
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// The callback runs on the blocking pool, at most once.
    pub fn on_login<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.on_login = Some(Box::new(callback));
        self
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("repo_url", &self.repo_url)
            .field("permissions", &self.permissions)
            .field("on_login", &self.on_login.is_some())
            .finish()
    }
}

/// Progress of the linked access token as seen by polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenWaitState {
    Unknown,
    /// Awaiting token data with a login URL; the callback is still pending.
    AwaitingLogin { url: String },
    LoginDispatched,
    Ready,
}

impl TokenWaitState {
    /// Applies one observation. `Ready` is absorbing, and once the login has
    /// been dispatched further `AwaitingTokenData` observations change nothing.
    pub fn observe(self, status: &AccessTokenStatus) -> Self {
        match (self, status.phase) {
            (Self::Ready, _) | (_, TokenPhase::Ready) => Self::Ready,
            (Self::LoginDispatched, _) => Self::LoginDispatched,
            (Self::Unknown | Self::AwaitingLogin { .. }, TokenPhase::AwaitingTokenData)
                if !status.oauth_url.is_empty() =>
            {
                Self::AwaitingLogin {
                    url: status.oauth_url.clone(),
                }
            }
            (state, _) => state,
        }
    }
}

/// Obtains access tokens by creating token bindings and waiting for the
/// broker to fulfil them.
#[derive(Debug, Clone)]
pub struct SpiTokenFetcher<S> {
    store: S,
    config: FetcherConfig,
}

impl<S: ResourceStore> SpiTokenFetcher<S> {
    pub fn new(store: S, config: FetcherConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub async fn acquire_token(
        &self,
        request: TokenRequest,
    ) -> Result<AuthorizationHeader, FetchError> {
        self.acquire_token_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Runs the whole acquisition. Created resources are left in the store
    /// whatever the outcome.
    pub async fn acquire_token_with_cancel(
        &self,
        request: TokenRequest,
        cancel: CancellationToken,
    ) -> Result<AuthorizationHeader, FetchError> {
        let TokenRequest {
            repo_url,
            permissions,
            on_login,
        } = request;

        let binding = self.request_binding(&repo_url, permissions, &cancel).await?;
        let token = self
            .wait_for_link(&binding.metadata.name, &cancel)
            .await?;
        self.wait_for_ready(&token, on_login, &cancel).await?;
        let credential = self
            .resolve_secret(&binding.spec.secret.name, &cancel)
            .await?;

        info!(
            repo_url = %repo_url,
            binding = %binding.metadata.name,
            token = %token,
            "access token acquired"
        );
        Ok(AuthorizationHeader::bearer(&credential))
    }

    pub fn build_binding(
        &self,
        repo_url: &str,
        permissions: Option<Permissions>,
    ) -> SpiAccessTokenBinding {
        SpiAccessTokenBinding::new(
            ObjectMeta::new(
                &self.config.namespace,
                naming::binding_name(&self.config.binding_prefix),
            ),
            BindingSpec {
                repo_url: repo_url.to_string(),
                permissions: permissions
                    .unwrap_or_else(|| self.config.default_permissions.clone()),
                secret: SecretSpec {
                    name: naming::secret_name(&self.config.secret_prefix),
                    secret_type: self.config.secret_type,
                },
            },
        )
    }

    async fn request_binding(
        &self,
        repo_url: &str,
        permissions: Option<Permissions>,
        cancel: &CancellationToken,
    ) -> Result<SpiAccessTokenBinding, FetchError> {
        let binding = self.build_binding(repo_url, permissions);
        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            created = self.store.create_binding(&binding) => created,
        };

        match created {
            Ok(()) => {
                info!(
                    namespace = %binding.metadata.namespace,
                    binding = %binding.metadata.name,
                    secret = %binding.spec.secret.name,
                    repo_url = %repo_url,
                    "created token binding"
                );
                Ok(binding)
            }
            Err(source) => {
                warn!(binding = %binding.metadata.name, error = %source, "token binding rejected");
                Err(FetchError::RequestRejected {
                    binding: binding.metadata.name,
                    source,
                })
            }
        }
    }

    async fn wait_for_link(
        &self,
        binding: &str,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let policy = &self.config.link_poll;
        let store = &self.store;
        let namespace = self.config.namespace.as_str();

        let linked = poll_until(
            policy,
            cancel,
            move || async move {
                store.get_binding(namespace, binding).await.map_err(|source| {
                    FetchError::StoreUnavailable {
                        kind: "binding",
                        name: binding.to_string(),
                        source,
                    }
                })
            },
            |observed: SpiAccessTokenBinding| Ok(observed.linked_token().map(str::to_string)),
        )
        .await;

        match linked {
            Ok(token) => {
                info!(binding = %binding, token = %token, "binding linked to access token");
                Ok(token)
            }
            Err(PollError::TimedOut) => Err(FetchError::LinkTimeout {
                binding: binding.to_string(),
                timeout: policy.timeout,
            }),
            Err(PollError::Cancelled) => Err(FetchError::Cancelled),
            Err(PollError::Failed(err)) => Err(err),
        }
    }

    async fn wait_for_ready(
        &self,
        token: &str,
        mut on_login: Option<LoginCallback>,
        cancel: &CancellationToken,
    ) -> Result<(), FetchError> {
        let policy = &self.config.token_poll;
        let store = &self.store;
        let namespace = self.config.namespace.as_str();
        let mut state = TokenWaitState::Unknown;

        let ready = poll_until(
            policy,
            cancel,
            move || async move {
                store
                    .get_token(namespace, token)
                    .await
                    .map_err(|source| match source {
                        StoreError::NotFound | StoreError::InvalidResponse(_) => {
                            FetchError::TokenLost {
                                token: token.to_string(),
                                source,
                            }
                        }
                        source => FetchError::StoreUnavailable {
                            kind: "token",
                            name: token.to_string(),
                            source,
                        },
                    })
            },
            |observed: SpiAccessToken| {
                state = match std::mem::replace(&mut state, TokenWaitState::Unknown)
                    .observe(&observed.status)
                {
                    TokenWaitState::AwaitingLogin { url } => {
                        info!(token = %token, url = %url, "access token awaits login");
                        if let Some(callback) = on_login.take() {
                            tokio::task::spawn_blocking(move || callback(url));
                        }
                        TokenWaitState::LoginDispatched
                    }
                    TokenWaitState::Ready => return Ok(Some(())),
                    other => other,
                };
                debug!(token = %token, phase = ?observed.status.phase, "access token not ready");
                Ok(None)
            },
        )
        .await;

        match ready {
            Ok(()) => {
                info!(token = %token, "access token ready");
                Ok(())
            }
            Err(PollError::TimedOut) => Err(FetchError::TokenTimeout {
                token: token.to_string(),
                timeout: policy.timeout,
            }),
            Err(PollError::Cancelled) => Err(FetchError::Cancelled),
            Err(PollError::Failed(err)) => Err(err),
        }
    }

    /// Must only run after the token was observed `Ready`; before that the
    /// broker may not have written the secret yet.
    async fn resolve_secret(
        &self,
        secret: &str,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            fetched = self.store.get_secret(&self.config.namespace, secret) => fetched,
        };

        match fetched {
            Ok(found) => decode_credential(&found),
            Err(StoreError::NotFound) => Err(FetchError::SecretMissing {
                secret: secret.to_string(),
            }),
            Err(source) => Err(FetchError::StoreUnavailable {
                kind: "secret",
                name: secret.to_string(),
                source,
            }),
        }
    }
}

/// Decodes the base64 `password` entry of a token secret.
pub fn decode_credential(secret: &Secret) -> Result<String, FetchError> {
    let decode_error = |message: String| FetchError::Decode {
        secret: secret.metadata.name.clone(),
        message,
    };

    let encoded = secret
        .data
        .get(SECRET_PASSWORD_KEY)
        .ok_or_else(|| decode_error(format!("missing {SECRET_PASSWORD_KEY} entry")))?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| decode_error(err.to_string()))?;
    let credential = String::from_utf8(bytes).map_err(|err| decode_error(err.to_string()))?;

    let credential = credential.trim();
    if credential.is_empty() {
        return Err(decode_error("empty credential".to_string()));
    }
    if credential.chars().any(char::is_control) {
        return Err(decode_error("credential contains control characters".to_string()));
    }
    Ok(credential.to_string())
}
