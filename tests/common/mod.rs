//! Scripted in-memory resource store standing in for the SPI operator.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use spi_token_fetcher::{
    FetcherConfig, ObjectMeta, PollPolicy, ResourceStore, SECRET_PASSWORD_KEY, Secret,
    SpiAccessToken, SpiAccessTokenBinding, SpiTokenFetcher, StoreError, TokenPhase,
};

pub const LOGIN_URL: &str = "https://spi.example.com/oauth/authenticate?state=xyz";

/// base64("abc123")
pub const ENCODED_PASSWORD: &str = "YWJjMTIz";

#[derive(Debug, Default)]
struct Inner {
    bindings: HashMap<String, SpiAccessTokenBinding>,
    binding_reads: HashMap<String, usize>,
    token_reads: HashMap<String, usize>,
}

/// Behaves like the operator: links a binding after `link_after` reads and
/// walks each token through `token_phases`, one phase per read, repeating
/// the last one.
#[derive(Debug)]
pub struct ScriptedStore {
    inner: Mutex<Inner>,
    link_after: usize,
    token_phases: Vec<TokenPhase>,
    password: Option<String>,
    reject_create: bool,
    lose_binding: bool,
    token_error: Option<StoreError>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            link_after: 0,
            token_phases: vec![TokenPhase::Ready],
            password: Some(ENCODED_PASSWORD.to_string()),
            reject_create: false,
            lose_binding: false,
            token_error: None,
        }
    }

    pub fn link_after(mut self, reads: usize) -> Self {
        self.link_after = reads;
        self
    }

    pub fn never_link(self) -> Self {
        self.link_after(usize::MAX)
    }

    pub fn token_phases(mut self, phases: impl IntoIterator<Item = TokenPhase>) -> Self {
        self.token_phases = phases.into_iter().collect();
        self
    }

    pub fn password(mut self, encoded: Option<&str>) -> Self {
        self.password = encoded.map(str::to_string);
        self
    }

    pub fn reject_create(mut self) -> Self {
        self.reject_create = true;
        self
    }

    pub fn lose_binding(mut self) -> Self {
        self.lose_binding = true;
        self
    }

    pub fn lose_token(self) -> Self {
        self.fail_token_reads(StoreError::NotFound)
    }

    pub fn fail_token_reads(mut self, error: StoreError) -> Self {
        self.token_error = Some(error);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn bindings(&self) -> Vec<SpiAccessTokenBinding> {
        self.inner.lock().unwrap().bindings.values().cloned().collect()
    }

    pub fn binding_reads(&self) -> usize {
        self.inner.lock().unwrap().binding_reads.values().sum()
    }

    pub fn token_reads(&self) -> usize {
        self.inner.lock().unwrap().token_reads.values().sum()
    }
}

fn token_name(binding: &str) -> String {
    format!("token-for-{binding}")
}

#[async_trait]
impl ResourceStore for ScriptedStore {
    async fn create_binding(&self, binding: &SpiAccessTokenBinding) -> Result<(), StoreError> {
        if self.reject_create {
            return Err(StoreError::Rejected {
                status: 403,
                message: "forbidden".to_string(),
            });
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.bindings.contains_key(&binding.metadata.name) {
            return Err(StoreError::AlreadyExists);
        }
        inner
            .bindings
            .insert(binding.metadata.name.clone(), binding.clone());
        Ok(())
    }

    async fn get_binding(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<SpiAccessTokenBinding, StoreError> {
        if self.lose_binding {
            return Err(StoreError::NotFound);
        }
        let mut inner = self.inner.lock().unwrap();
        let reads = {
            let reads = inner.binding_reads.entry(name.to_string()).or_default();
            *reads += 1;
            *reads
        };
        let binding = inner.bindings.get_mut(name).ok_or(StoreError::NotFound)?;
        if reads > self.link_after {
            binding.status.linked_access_token_name = token_name(name);
        }
        Ok(binding.clone())
    }

    async fn get_token(&self, namespace: &str, name: &str) -> Result<SpiAccessToken, StoreError> {
        if let Some(error) = &self.token_error {
            return Err(error.clone());
        }
        let mut inner = self.inner.lock().unwrap();
        let reads = inner.token_reads.entry(name.to_string()).or_default();
        let phase = self
            .token_phases
            .get(*reads)
            .or(self.token_phases.last())
            .copied()
            .unwrap_or_default();
        *reads += 1;

        let url = if phase == TokenPhase::AwaitingTokenData {
            LOGIN_URL
        } else {
            ""
        };
        Ok(SpiAccessToken::new(ObjectMeta::new(namespace, name)).with_status(phase, url))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        let inner = self.inner.lock().unwrap();
        let known = inner
            .bindings
            .values()
            .any(|binding| binding.spec.secret.name == name);
        match (&self.password, known) {
            (Some(password), true) => Ok(Secret {
                metadata: ObjectMeta::new(namespace, name),
                data: BTreeMap::from([(SECRET_PASSWORD_KEY.to_string(), password.clone())]),
            }),
            _ => Err(StoreError::NotFound),
        }
    }
}

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const LINK_TIMEOUT: Duration = Duration::from_secs(5);
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

pub fn config() -> FetcherConfig {
    FetcherConfig::new()
        .with_link_poll(PollPolicy::new(POLL_INTERVAL, LINK_TIMEOUT))
        .with_token_poll(PollPolicy::new(POLL_INTERVAL, TOKEN_TIMEOUT))
}

pub fn fetcher(store: &Arc<ScriptedStore>) -> SpiTokenFetcher<Arc<ScriptedStore>> {
    SpiTokenFetcher::new(store.clone(), config())
}
