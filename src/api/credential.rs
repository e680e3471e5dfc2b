//! Replaceable API credential
//!
//! The credential is an opaque key read on every request. When the upstream rejects it, the
//! pipeline asks a [`CredentialSource`] for a replacement and retries the same unit.

use async_trait::async_trait;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Shared, replaceable API key
#[derive(Debug, Clone)]
pub struct Credential {
    key: Arc<RwLock<String>>,
}

impl Credential {
    /// Wrap an initial key
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Arc::new(RwLock::new(key.into())),
        }
    }

    /// The key to send with the next request
    pub fn current(&self) -> String {
        self.key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install a replacement key for every holder of this handle
    pub fn replace(&self, key: impl Into<String>) {
        *self.key.write().unwrap_or_else(PoisonError::into_inner) = key.into();
    }
}

/// External hook consulted when the upstream rejects the current key
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// A key to use instead of `expired`, or `None` when no replacement is available
    async fn replace(&self, expired: &str) -> Option<String>;
}

/// Never offers a replacement
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticCredential;

#[async_trait]
impl CredentialSource for StaticCredential {
    async fn replace(&self, _expired: &str) -> Option<String> {
        None
    }
}

/// Replacement computed by a closure
pub struct FnCredentialSource<F> {
    f: F,
}

impl<F> FnCredentialSource<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    /// Wrap a closure receiving the expired key
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> CredentialSource for FnCredentialSource<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    async fn replace(&self, expired: &str) -> Option<String> {
        (self.f)(expired)
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    riot_api_key: String,
}

/// Re-reads a `{"riot_api_key": "..."}` file; offers its key only if it differs from the
/// expired one
#[derive(Debug, Clone)]
pub struct FileCredentialSource {
    path: PathBuf,
}

impl FileCredentialSource {
    /// Source backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the key currently stored in the file
    pub fn read_key(&self) -> Option<String> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read credentials file");
                return None;
            }
        };
        match serde_json::from_str::<CredentialsFile>(&contents) {
            Ok(file) => Some(file.riot_api_key.trim().to_string()).filter(|k| !k.is_empty()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed credentials file");
                None
            }
        }
    }
}

#[async_trait]
impl CredentialSource for FileCredentialSource {
    async fn replace(&self, expired: &str) -> Option<String> {
        let key = self.read_key().filter(|key| key != expired);
        if key.is_some() {
            info!(path = %self.path.display(), "Picked up new key from credentials file");
        }
        key
    }
}

/// Asks an operator on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptCredentialSource;

#[async_trait]
impl CredentialSource for PromptCredentialSource {
    async fn replace(&self, _expired: &str) -> Option<String> {
        let answer = tokio::task::spawn_blocking(|| {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "API key expired. Please enter a new API key: ");
            let _ = stderr.flush();

            let mut line = String::new();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line.trim().to_string()),
            }
        })
        .await
        .ok()
        .flatten();

        answer.filter(|key| !key.is_empty())
    }
}

/// Tries each source in order until one offers a key
pub struct ChainedCredentialSource {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl ChainedCredentialSource {
    /// Chain `sources`, first one wins
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl CredentialSource for ChainedCredentialSource {
    async fn replace(&self, expired: &str) -> Option<String> {
        for source in &self.sources {
            if let Some(key) = source.replace(expired).await {
                return Some(key);
            }
        }
        None
    }
}
