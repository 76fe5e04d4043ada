use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use reqwest::header::{HeaderValue, InvalidHeaderValue};
use serde::{Deserialize, Serialize};

pub const API_GROUP_VERSION: &str = "appstudio.redhat.com/v1beta1";
pub const BINDING_KIND: &str = "SPIAccessTokenBinding";
pub const TOKEN_KIND: &str = "SPIAccessToken";

/// Key in the token secret holding the base64 credential.
pub const SECRET_PASSWORD_KEY: &str = "password";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// Request for a token matching a repository URL and permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiAccessTokenBinding {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: BindingSpec,
    #[serde(default)]
    pub status: BindingStatus,
}

impl SpiAccessTokenBinding {
    pub fn new(metadata: ObjectMeta, spec: BindingSpec) -> Self {
        Self {
            api_version: API_GROUP_VERSION.to_string(),
            kind: BINDING_KIND.to_string(),
            metadata,
            spec,
            status: BindingStatus::default(),
        }
    }

    /// Name of the linked access token, once the broker has assigned one.
    pub fn linked_token(&self) -> Option<&str> {
        let name = self.status.linked_access_token_name.as_str();
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSpec {
    pub repo_url: String,
    pub permissions: Permissions,
    pub secret: SecretSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingStatus {
    #[serde(default)]
    pub linked_access_token_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub secret_type: SecretType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretType {
    #[default]
    #[serde(rename = "kubernetes.io/basic-auth")]
    BasicAuth,
    #[serde(rename = "Opaque")]
    Opaque,
    #[serde(rename = "kubernetes.io/service-account-token")]
    ServiceAccountToken,
    #[serde(rename = "kubernetes.io/dockerconfigjson")]
    DockerConfigJson,
}

/// Broker-managed credential object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiAccessToken {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: AccessTokenSpec,
    #[serde(default)]
    pub status: AccessTokenStatus,
}

impl SpiAccessToken {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: API_GROUP_VERSION.to_string(),
            kind: TOKEN_KIND.to_string(),
            metadata,
            spec: AccessTokenSpec::default(),
            status: AccessTokenStatus::default(),
        }
    }

    pub fn with_status(mut self, phase: TokenPhase, oauth_url: impl Into<String>) -> Self {
        self.status = AccessTokenStatus {
            phase,
            oauth_url: oauth_url.into(),
        };
        self
    }

    /// Login URL, only meaningful while awaiting token data.
    pub fn login_url(&self) -> Option<&str> {
        match self.status.phase {
            TokenPhase::AwaitingTokenData if !self.status.oauth_url.is_empty() => {
                Some(self.status.oauth_url.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenSpec {
    #[serde(default)]
    pub service_provider_type: Option<ServiceProviderType>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_provider_url: Option<String>,
    #[serde(default)]
    pub data_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_metadata: Option<TokenMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub user_name: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceProviderType {
    GitHub,
    Quay,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenStatus {
    #[serde(default)]
    pub phase: TokenPhase,
    #[serde(default, rename = "oAuthUrl")]
    pub oauth_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenPhase {
    AwaitingTokenData,
    Ready,
    /// Phase not yet set by the broker, or a phase this crate doesn't know.
    #[default]
    #[serde(other, rename = "")]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_scopes: Vec<String>,
}

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_permission(mut self, permission_type: PermissionType, area: PermissionArea) -> Self {
        self.required.push(Permission {
            permission_type,
            area,
        });
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.additional_scopes.push(scope.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "type")]
    pub permission_type: PermissionType,
    pub area: PermissionArea,
}

impl Permission {
    pub fn new(permission_type: PermissionType, area: PermissionArea) -> Self {
        Self {
            permission_type,
            area,
        }
    }
}

/// Parses `<type>:<area>`, e.g. `rw:repository` or `read:user`.
impl FromStr for Permission {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (permission_type, area) = value
            .split_once(':')
            .ok_or_else(|| format!("expected <type>:<area>, got {value:?}"))?;
        Ok(Self::new(permission_type.parse()?, area.parse()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionType {
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "w")]
    Write,
    #[serde(rename = "rw")]
    ReadWrite,
}

impl PermissionType {
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

impl FromStr for PermissionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "r" | "read" => Ok(Self::Read),
            "w" | "write" => Ok(Self::Write),
            "rw" | "read-write" => Ok(Self::ReadWrite),
            other => Err(format!("unknown permission type {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionArea {
    Repository,
    Webhooks,
    User,
}

impl FromStr for PermissionArea {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "repository" => Ok(Self::Repository),
            "webhooks" => Ok(Self::Webhooks),
            "user" => Ok(Self::User),
            other => Err(format!("unknown permission area {other:?}")),
        }
    }
}

/// Core `Secret` subset. Values in `data` are base64 text, as served by the
/// API server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Value for an HTTP `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationHeader(String);

impl AuthorizationHeader {
    pub fn bearer(credential: &str) -> Self {
        Self(format!("Bearer {credential}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

// Credentials stay out of logs.
impl fmt::Debug for AuthorizationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationHeader(Bearer ***)")
    }
}

impl TryFrom<&AuthorizationHeader> for HeaderValue {
    type Error = InvalidHeaderValue;

    fn try_from(header: &AuthorizationHeader) -> Result<Self, Self::Error> {
        let mut value = HeaderValue::from_str(&header.0)?;
        value.set_sensitive(true);
        Ok(value)
    }
}
