use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use reqwest::{Certificate, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::{
    BootstrapError, ResourceStore, Secret, SpiAccessToken, SpiAccessTokenBinding, StoreError,
};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const API_GROUP: &str = "appstudio.redhat.com";
const API_VERSION: &str = "v1beta1";
const BINDINGS: &str = "spiaccesstokenbindings";
const TOKENS: &str = "spiaccesstokens";

/// [`ResourceStore`] backed by the Kubernetes REST API.
#[derive(Clone)]
pub struct KubeStore {
    http: Client,
    api_server: Url,
    token: Option<String>,
}

impl KubeStore {
    pub fn new(api_server: Url, token: Option<String>) -> Result<Self, BootstrapError> {
        let http = Client::builder().build()?;
        Ok(Self::with_http_client(api_server, token, http))
    }

    pub fn with_http_client(api_server: Url, token: Option<String>, http: Client) -> Self {
        Self {
            http,
            api_server,
            token,
        }
    }

    /// Connects with the pod's service account credentials.
    pub fn in_cluster() -> Result<Self, BootstrapError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| BootstrapError::MissingEnv("KUBERNETES_SERVICE_HOST"))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| BootstrapError::MissingEnv("KUBERNETES_SERVICE_PORT"))?;
        let api_server = Url::parse(&format!("https://{}", join_host_port(&host, &port)))?;

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = read_token_file(&dir.join("token"))?;
        let ca_path = dir.join("ca.crt");
        let ca = std::fs::read(&ca_path).map_err(|source| BootstrapError::Io {
            path: ca_path.display().to_string(),
            source,
        })?;

        let http = Client::builder()
            .add_root_certificate(Certificate::from_pem(&ca)?)
            .build()?;
        debug!(api_server = %api_server, "using in-cluster store configuration");
        Ok(Self::with_http_client(api_server, Some(token), http))
    }

    /// Connects to `api_server` with a bearer token read from `token_path`.
    pub fn from_token_file(
        api_server: Url,
        token_path: impl AsRef<Path>,
    ) -> Result<Self, BootstrapError> {
        let token = read_token_file(token_path.as_ref())?;
        Self::new(api_server, Some(token))
    }

    pub fn api_server(&self) -> &Url {
        &self.api_server
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_server.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn custom_resource_url(&self, namespace: &str, plural: &str, name: Option<&str>) -> Url {
        let mut segments = vec!["apis", API_GROUP, API_VERSION, "namespaces", namespace, plural];
        segments.extend(name);
        self.endpoint(&segments)
    }

    fn secret_url(&self, namespace: &str, name: &str) -> Url {
        self.endpoint(&["api", "v1", "namespaces", namespace, "secrets", name])
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let builder = match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => StoreError::NotFound,
            StatusCode::CONFLICT => StoreError::AlreadyExists,
            _ => StoreError::Rejected {
                status: status.as_u16(),
                message: status_message(&body),
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, StoreError> {
        let response = self.send(self.http.get(url)).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| StoreError::InvalidResponse(err.to_string()))
    }
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore")
            .field("api_server", &self.api_server.as_str())
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn create_binding(&self, binding: &SpiAccessTokenBinding) -> Result<(), StoreError> {
        let url = self.custom_resource_url(&binding.metadata.namespace, BINDINGS, None);
        self.send(self.http.post(url).json(binding)).await?;
        Ok(())
    }

    async fn get_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SpiAccessTokenBinding, StoreError> {
        self.get_json(self.custom_resource_url(namespace, BINDINGS, Some(name)))
            .await
    }

    async fn get_token(&self, namespace: &str, name: &str) -> Result<SpiAccessToken, StoreError> {
        self.get_json(self.custom_resource_url(namespace, TOKENS, Some(name)))
            .await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        self.get_json(self.secret_url(namespace, name)).await
    }
}

fn read_token_file(path: &Path) -> Result<String, BootstrapError> {
    let token = std::fs::read_to_string(path).map_err(|source| BootstrapError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let token = token.trim();
    if token.is_empty() {
        return Err(BootstrapError::InvalidToken);
    }
    Ok(token.to_string())
}

fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Extracts `message` from a Kubernetes `Status` body, falling back to the raw body.
fn status_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
