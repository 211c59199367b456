use async_trait::async_trait;

use crate::error::Error;
use crate::models::{Credential, PresenceConfig};

/// Result of a config lookup. `is_default` is set when the holder never
/// stored a config and the documented default was handed out instead.
#[derive(Debug, Clone)]
pub struct ConfigLookup {
    pub config: PresenceConfig,
    pub is_default: bool,
}

/// Per-holder token storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, holder: &str) -> Result<Vec<Credential>, Error>;
    async fn exists(&self, holder: &str, value: &str) -> Result<bool, Error>;

    /// Returns false when the token is already stored for this holder.
    async fn add(&self, holder: &str, username: &str, value: &str) -> Result<bool, Error>;

    /// Returns false when nothing was removed.
    async fn remove(&self, holder: &str, value: &str) -> Result<bool, Error>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, holder: &str) -> Result<ConfigLookup, Error>;
    async fn set(&self, holder: &str, config: &PresenceConfig) -> Result<(), Error>;
}

/// Holders whose stream was running, so it can be brought back after a restart.
#[async_trait]
pub trait ActiveHolderStore: Send + Sync {
    async fn list(&self) -> Result<Vec<String>, Error>;
    async fn add(&self, holder: &str) -> Result<(), Error>;
    async fn remove(&self, holder: &str) -> Result<(), Error>;
}
