//! Obtain SCM access tokens through Service Provider Integration (SPI).
//!
//! Instead of running an OAuth flow itself, the fetcher creates an
//! `SPIAccessTokenBinding` for a repository URL, waits for the SPI operator to
//! link it to an `SPIAccessToken`, hands the login URL to the caller when a
//! human has to authorize, and finally reads the token secret into a `Bearer`
//! authorization header. Every wait is bounded and cancellable.

mod config;
mod error;
mod fetcher;
mod kube;
mod naming;
mod poll;
mod source;
mod store;
mod types;

pub use config::{
    DEFAULT_BINDING_PREFIX, DEFAULT_NAMESPACE, DEFAULT_SCOPE, DEFAULT_SECRET_PREFIX,
    FetcherConfig,
};
pub use error::{BootstrapError, FetchError, StoreError};
pub use fetcher::{
    LoginCallback, SpiTokenFetcher, TokenRequest, TokenWaitState, decode_credential,
};
pub use kube::KubeStore;
pub use naming::{BINDING_SUFFIX_LEN, SECRET_SUFFIX_LEN, random_suffix};
pub use poll::{PollError, PollPolicy, poll_until};
pub use source::{DEFAULT_TOKEN_ENV, EnvTokenSource, TokenSource};
pub use store::ResourceStore;
pub use types::{
    API_GROUP_VERSION, AccessTokenSpec, AccessTokenStatus, AuthorizationHeader, BINDING_KIND,
    BindingSpec, BindingStatus, ObjectMeta, Permission, PermissionArea, PermissionType,
    Permissions, SECRET_PASSWORD_KEY, Secret, SecretSpec, SecretType, ServiceProviderType,
    SpiAccessToken, SpiAccessTokenBinding, TOKEN_KIND, TokenMetadata, TokenPhase,
};

pub use tokio_util::sync::CancellationToken;
