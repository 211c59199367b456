// File: presencebot-core/src/test_utils/helpers.rs
//
// In-process stand-ins for the gateway, the image endpoint, and the JSON
// stores, so sessions and the manager can be driven without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use presencebot_common::models::{
    AccountIdentity, Credential, GuildSummary, HolderCredentials, PresenceConfig, PresencePayload,
};
use presencebot_common::traits::repository_traits::{
    ActiveHolderStore, ConfigLookup, ConfigStore, CredentialStore,
};

use crate::cache::ImageCache;
use crate::http::DefaultHttpClient;
use crate::platforms::{
    ConnectionStatus, ImageRequest, ImageResolver, PresenceTransport, ResolvedImages,
    TransportEvent, TransportFactory,
};
use crate::samplers::SystemSampler;
use crate::services::ManagerStores;
use crate::session::{SessionDeps, SessionTimings, DEFAULT_APPLICATION_ID};
use crate::utils::MemoryProbe;
use crate::Error;

pub const TEST_USERNAME: &str = "tester";
const DEFAULT_LATENCY: Duration = Duration::from_millis(42);

/// A well-formed, unique token for the `n`th test account.
pub fn test_credential(n: u32) -> Credential {
    Credential::new(format!("dGVzdC{n}.YWJj.ZGVmZ2g"))
}

/// Session collaborators wired to fakes. No weather key, so nothing polls.
pub fn session_deps<F>(transports: F, images: Arc<dyn ImageResolver>) -> SessionDeps
where
    F: TransportFactory + 'static,
{
    SessionDeps {
        transports: Arc::new(transports),
        images,
        image_cache: Arc::new(ImageCache::default()),
        system: Arc::new(SystemSampler::new()),
        http: Arc::new(DefaultHttpClient::default()),
        weather_api_key: None,
        default_application_id: DEFAULT_APPLICATION_ID.to_string(),
        timings: SessionTimings::default(),
    }
}

#[derive(Default)]
struct FakeShared {
    created: AtomicUsize,
    /// Transports numbered at or below this report `Disconnected`.
    unhealthy_until: usize,
    /// Every connected transport reports `Disconnected` while set.
    dropped: AtomicBool,
    reject_auth: AtomicBool,
    latency: Mutex<Option<Duration>>,
    publish_delay: Duration,
    payloads: Mutex<Vec<PresencePayload>>,
}

/// Gateway stand-in. Records every payload it is asked to publish.
pub struct FakeTransport {
    index: usize,
    shared: Arc<FakeShared>,
    connected: AtomicBool,
    events: broadcast::Sender<TransportEvent>,
}

#[async_trait]
impl PresenceTransport for FakeTransport {
    async fn connect(&self, credential: &Credential) -> Result<AccountIdentity, Error> {
        if self.shared.reject_auth.load(Ordering::Acquire) {
            return Err(Error::Auth(format!("rejected {}", credential.mask())));
        }
        self.connected.store(true, Ordering::Release);
        let _ = self.events.send(TransportEvent::Ready);
        Ok(AccountIdentity {
            user_id: format!("10000{}", self.index),
            username: TEST_USERNAME.to_string(),
            avatar_url: Some(format!("https://cdn.example/avatar{}.png", self.index)),
            banner_url: None,
        })
    }

    async fn disconnect(&self) -> Result<(), Error> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    async fn publish(&self, payload: &PresencePayload) -> Result<(), Error> {
        if !self.shared.publish_delay.is_zero() {
            tokio::time::sleep(self.shared.publish_delay).await;
        }
        if !self.connected.load(Ordering::Acquire) {
            return Err(Error::Platform("fake transport is closed".into()));
        }
        self.shared.payloads.lock().push(payload.clone());
        Ok(())
    }

    fn connection_status(&self) -> ConnectionStatus {
        if !self.connected.load(Ordering::Acquire) {
            ConnectionStatus::Closed
        } else if self.index <= self.shared.unhealthy_until
            || self.shared.dropped.load(Ordering::Acquire)
        {
            ConnectionStatus::Disconnected
        } else {
            ConnectionStatus::Connected
        }
    }

    fn round_trip_latency(&self) -> Option<Duration> {
        *self.shared.latency.lock()
    }

    fn guild(&self, id: &str) -> Option<GuildSummary> {
        (id == "1").then(|| GuildSummary {
            name: "Test Guild".to_string(),
            member_count: Some(10),
            icon_url: None,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

/// Hands out [`FakeTransport`]s that share one recording.
#[derive(Clone)]
pub struct FakeTransportFactory {
    shared: Arc<FakeShared>,
}

impl FakeTransportFactory {
    fn with(shared: FakeShared) -> Self {
        *shared.latency.lock() = Some(DEFAULT_LATENCY);
        Self { shared: Arc::new(shared) }
    }

    pub fn healthy() -> Self {
        Self::with(FakeShared::default())
    }

    /// The first `n` connections come up but immediately look dropped.
    pub fn healthy_after(n: usize) -> Self {
        Self::with(FakeShared { unhealthy_until: n, ..FakeShared::default() })
    }

    /// Every publish takes `delay` to complete.
    pub fn slow(delay: Duration) -> Self {
        Self::with(FakeShared { publish_delay: delay, ..FakeShared::default() })
    }

    pub fn rejecting() -> Self {
        let factory = Self::healthy();
        factory.set_reject_auth(true);
        factory
    }

    pub fn set_reject_auth(&self, reject: bool) {
        self.shared.reject_auth.store(reject, Ordering::Release);
    }

    pub fn set_dropped(&self, dropped: bool) {
        self.shared.dropped.store(dropped, Ordering::Release);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.shared.latency.lock() = latency;
    }

    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::Acquire)
    }

    pub fn payloads(&self) -> Vec<PresencePayload> {
        self.shared.payloads.lock().clone()
    }

    pub fn last_payload(&self) -> Option<PresencePayload> {
        self.shared.payloads.lock().last().cloned()
    }
}

impl TransportFactory for FakeTransportFactory {
    fn create(&self) -> Arc<dyn PresenceTransport> {
        let index = self.shared.created.fetch_add(1, Ordering::AcqRel) + 1;
        let (events, _) = broadcast::channel(8);
        Arc::new(FakeTransport {
            index,
            shared: Arc::clone(&self.shared),
            connected: AtomicBool::new(false),
            events,
        })
    }
}

/// Reports the requested URLs back as gateway references.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoImageResolver;

#[async_trait]
impl ImageResolver for EchoImageResolver {
    async fn resolve(&self, request: &ImageRequest) -> Result<ResolvedImages, Error> {
        let reference = |u: &Option<String>| u.as_ref().map(|u| format!("mp:{u}"));
        Ok(ResolvedImages {
            large: reference(&request.large),
            small: reference(&request.small),
        })
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    holders: Mutex<HashMap<String, HolderCredentials>>,
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, holder: &str) -> Result<Vec<Credential>, Error> {
        Ok(self
            .holders
            .lock()
            .get(holder)
            .map(|h| h.tokens.clone())
            .unwrap_or_default())
    }

    async fn exists(&self, holder: &str, value: &str) -> Result<bool, Error> {
        Ok(self
            .holders
            .lock()
            .get(holder)
            .is_some_and(|h| h.tokens.iter().any(|t| t.value == value)))
    }

    async fn add(&self, holder: &str, username: &str, value: &str) -> Result<bool, Error> {
        let mut holders = self.holders.lock();
        let entry = holders.entry(holder.to_string()).or_default();
        entry.username = username.to_string();
        if entry.tokens.iter().any(|t| t.value == value) {
            return Ok(false);
        }
        entry.tokens.push(Credential::new(value));
        Ok(true)
    }

    async fn remove(&self, holder: &str, value: &str) -> Result<bool, Error> {
        let mut holders = self.holders.lock();
        let Some(entry) = holders.get_mut(holder) else {
            return Ok(false);
        };
        let before = entry.tokens.len();
        entry.tokens.retain(|t| t.value != value);
        Ok(entry.tokens.len() != before)
    }
}

#[derive(Default)]
pub struct MemoryConfigStore {
    configs: Mutex<HashMap<String, PresenceConfig>>,
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, holder: &str) -> Result<ConfigLookup, Error> {
        Ok(match self.configs.lock().get(holder) {
            Some(config) => ConfigLookup { config: config.clone(), is_default: false },
            None => ConfigLookup { config: PresenceConfig::default_document(), is_default: true },
        })
    }

    async fn set(&self, holder: &str, config: &PresenceConfig) -> Result<(), Error> {
        config.validate()?;
        self.configs.lock().insert(holder.to_string(), config.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryActiveHolderStore {
    holders: Mutex<Vec<String>>,
}

#[async_trait]
impl ActiveHolderStore for MemoryActiveHolderStore {
    async fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.holders.lock().clone())
    }

    async fn add(&self, holder: &str) -> Result<(), Error> {
        let mut holders = self.holders.lock();
        if !holders.iter().any(|h| h == holder) {
            holders.push(holder.to_string());
        }
        Ok(())
    }

    async fn remove(&self, holder: &str) -> Result<(), Error> {
        self.holders.lock().retain(|h| h != holder);
        Ok(())
    }
}

/// The three in-memory stores, kept as concrete types so tests can seed them.
#[derive(Clone, Default)]
pub struct MemoryStores {
    pub credentials: Arc<MemoryCredentialStore>,
    pub configs: Arc<MemoryConfigStore>,
    pub active: Arc<MemoryActiveHolderStore>,
}

impl MemoryStores {
    pub fn manager_stores(&self) -> ManagerStores {
        ManagerStores {
            credentials: self.credentials.clone(),
            configs: self.configs.clone(),
            active: self.active.clone(),
        }
    }
}

/// Memory probe whose reading tests can move around.
#[derive(Default)]
pub struct FixedMemoryProbe {
    percent: Mutex<f64>,
}

impl FixedMemoryProbe {
    pub fn new(percent: f64) -> Self {
        Self { percent: Mutex::new(percent) }
    }

    pub fn set(&self, percent: f64) {
        *self.percent.lock() = percent;
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn usage_percent(&self) -> f64 {
        *self.percent.lock()
    }
}
