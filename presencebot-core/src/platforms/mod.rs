// File: presencebot-core/src/platforms/mod.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use presencebot_common::models::{AccountIdentity, Credential, GuildSummary, PresencePayload};

use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting,
    Closed,
    Error(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Lifecycle notifications a transport emits after the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Ready,
    Disconnected,
    Reconnecting,
    Resumed,
    Error(String),
}

/// One authenticated connection to the presence gateway.
#[async_trait]
pub trait PresenceTransport: Send + Sync {
    /// Opens the connection and waits for the handshake. `Error::Auth` means
    /// the credential was rejected and retrying is pointless.
    async fn connect(&self, credential: &Credential) -> Result<AccountIdentity, Error>;
    async fn disconnect(&self) -> Result<(), Error>;
    async fn publish(&self, payload: &PresencePayload) -> Result<(), Error>;

    fn connection_status(&self) -> ConnectionStatus;
    fn round_trip_latency(&self) -> Option<Duration>;
    fn guild(&self, id: &str) -> Option<GuildSummary>;
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Hands out a fresh transport for every session (and every reconnect).
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Arc<dyn PresenceTransport>;
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub application_id: String,
    pub token: String,
    pub large: Option<String>,
    pub small: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedImages {
    pub large: Option<String>,
    pub small: Option<String>,
}

/// Turns configured image URLs into references the gateway accepts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(&self, request: &ImageRequest) -> Result<ResolvedImages, Error>;
}

pub mod discord;
