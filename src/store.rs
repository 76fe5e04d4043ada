use std::sync::Arc;

use async_trait::async_trait;

use crate::{Secret, SpiAccessToken, SpiAccessTokenBinding, StoreError};

/// Declarative resource store holding bindings, tokens and secrets.
///
/// Implementations must tolerate concurrent calls: one store instance is
/// shared by every in-flight acquisition.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fails with [`StoreError::AlreadyExists`] if the name is taken.
    async fn create_binding(&self, binding: &SpiAccessTokenBinding) -> Result<(), StoreError>;

    async fn get_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SpiAccessTokenBinding, StoreError>;

    async fn get_token(&self, namespace: &str, name: &str) -> Result<SpiAccessToken, StoreError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError>;
}

#[async_trait]
impl<T: ResourceStore + ?Sized> ResourceStore for Arc<T> {
    async fn create_binding(&self, binding: &SpiAccessTokenBinding) -> Result<(), StoreError> {
        (**self).create_binding(binding).await
    }

    async fn get_binding(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SpiAccessTokenBinding, StoreError> {
        (**self).get_binding(namespace, name).await
    }

    async fn get_token(&self, namespace: &str, name: &str) -> Result<SpiAccessToken, StoreError> {
        (**self).get_token(namespace, name).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        (**self).get_secret(namespace, name).await
    }
}
