use std::time::Duration;

use crate::{PermissionArea, PermissionType, Permissions, PollPolicy, SecretType};

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_BINDING_PREFIX: &str = "file-retriever-binding-";
pub const DEFAULT_SECRET_PREFIX: &str = "file-retriever-secret-";
pub const DEFAULT_SCOPE: &str = "api";

const LINK_POLL_INTERVAL: Duration = Duration::from_millis(500);
const LINK_POLL_MAX_INTERVAL: Duration = Duration::from_secs(5);
const LINK_TIMEOUT: Duration = Duration::from_secs(60);
const TOKEN_POLL_INTERVAL: Duration = Duration::from_secs(1);
const TOKEN_POLL_MAX_INTERVAL: Duration = Duration::from_secs(5);
const TOKEN_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    pub namespace: String,
    pub binding_prefix: String,
    pub secret_prefix: String,
    pub secret_type: SecretType,
    /// Used when a request doesn't carry its own permissions.
    pub default_permissions: Permissions,
    pub link_poll: PollPolicy,
    /// Covers the interactive login, so it is much longer than `link_poll`.
    pub token_poll: PollPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            binding_prefix: DEFAULT_BINDING_PREFIX.to_string(),
            secret_prefix: DEFAULT_SECRET_PREFIX.to_string(),
            secret_type: SecretType::BasicAuth,
            default_permissions: Permissions::new()
                .with_permission(PermissionType::ReadWrite, PermissionArea::Repository)
                .with_scope(DEFAULT_SCOPE),
            link_poll: PollPolicy::new(LINK_POLL_INTERVAL, LINK_TIMEOUT)
                .with_max_interval(LINK_POLL_MAX_INTERVAL),
            token_poll: PollPolicy::new(TOKEN_POLL_INTERVAL, TOKEN_TIMEOUT)
                .with_max_interval(TOKEN_POLL_MAX_INTERVAL),
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_binding_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.binding_prefix = prefix.into();
        self
    }

    pub fn with_secret_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.secret_prefix = prefix.into();
        self
    }

    pub fn with_secret_type(mut self, secret_type: SecretType) -> Self {
        self.secret_type = secret_type;
        self
    }

    pub fn with_default_permissions(mut self, permissions: Permissions) -> Self {
        self.default_permissions = permissions;
        self
    }

    pub fn with_link_poll(mut self, policy: PollPolicy) -> Self {
        self.link_poll = policy;
        self
    }

    pub fn with_token_poll(mut self, policy: PollPolicy) -> Self {
        self.token_poll = policy;
        self
    }

    pub fn with_link_timeout(mut self, timeout: Duration) -> Self {
        self.link_poll = self.link_poll.with_timeout(timeout);
        self
    }

    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_poll = self.token_poll.with_timeout(timeout);
        self
    }
}
