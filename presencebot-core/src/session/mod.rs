// File: presencebot-core/src/session/mod.rs
//
// One long-lived presence stream: a transport connection for a single
// credential, its rotation cursors, and the publish / reconnect loop.

pub mod backoff;
pub mod state;

pub use backoff::{Backoff, Decision, SessionTimings};
pub use state::{Scheduled, SessionSnapshot, SessionState, Wake};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use presencebot_common::models::{
    AccountIdentity, ButtonSpec, Credential, PresenceButton, PresenceConfig, PresencePayload, Slot,
    StreamPlatform,
};

use crate::cache::ImageCache;
use crate::http::HttpClient;
use crate::platforms::{
    ConnectionStatus, ImageRequest, ImageResolver, PresenceTransport, ResolvedImages,
    TransportEvent, TransportFactory,
};
use crate::rotation::RotationCursors;
use crate::samplers::{SystemSampler, WeatherSampler};
use crate::template::{build_context, render_str, TemplateContext, VariableSources};
use crate::Error;

/// Used when the configured watch URL is missing or not an http(s) URL.
pub const FALLBACK_WATCH_URL: &str = "https://www.twitch.tv/twitch";

/// Application the activity is attributed to when the config names none.
pub const DEFAULT_APPLICATION_ID: &str = "1109522937989562409";

/// Shared collaborators every session is built with.
#[derive(Clone)]
pub struct SessionDeps {
    pub transports: Arc<dyn TransportFactory>,
    pub images: Arc<dyn ImageResolver>,
    pub image_cache: Arc<ImageCache>,
    pub system: Arc<SystemSampler>,
    pub http: Arc<dyn HttpClient>,
    pub weather_api_key: Option<String>,
    pub default_application_id: String,
    pub timings: SessionTimings,
}

#[derive(Clone)]
struct Connection {
    transport: Arc<dyn PresenceTransport>,
    identity: AccountIdentity,
    connected_at: Instant,
    events: CancellationToken,
}

/// Clears the in-flight flag however the publish future ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Content chosen by the cursors for one tick, before rendering.
struct Picks {
    watch_url: Option<String>,
    texts: [Option<String>; 4],
    large: Option<String>,
    small: Option<String>,
    buttons: Vec<ButtonSpec>,
}

pub struct Session {
    holder: String,
    label: String,
    credential: Credential,
    config: Arc<PresenceConfig>,
    deps: SessionDeps,
    weather: Arc<WeatherSampler>,

    connection: RwLock<Option<Connection>>,
    cursors: Mutex<RotationCursors>,
    backoff: Mutex<Backoff>,
    state: RwLock<SessionState>,
    next: RwLock<Option<Scheduled>>,

    in_flight: AtomicBool,
    publish_count: AtomicU64,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        holder: impl Into<String>,
        credential: Credential,
        config: Arc<PresenceConfig>,
        deps: SessionDeps,
    ) -> Arc<Self> {
        let holder = holder.into();
        let label = format!("{}/{}", holder, credential.mask());
        let weather = Arc::new(WeatherSampler::new(
            config.setup.city.clone(),
            deps.weather_api_key.clone(),
            Arc::clone(&deps.http),
        ));
        Arc::new(Self {
            label,
            holder,
            cursors: Mutex::new(RotationCursors::new(&config)),
            credential,
            config,
            deps,
            weather,
            connection: RwLock::new(None),
            backoff: Mutex::new(Backoff::new()),
            state: RwLock::new(SessionState::Init),
            next: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            publish_count: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
            task: Mutex::new(None),
        })
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn config(&self) -> &Arc<PresenceConfig> {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == SessionState::Terminated
    }

    pub fn publish_count(&self) -> u64 {
        self.publish_count.load(Ordering::Acquire)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        match self.connection.read().as_ref() {
            Some(c) => c.transport.connection_status(),
            None => ConnectionStatus::Closed,
        }
    }

    pub fn latency(&self) -> Option<Duration> {
        self.connection
            .read()
            .as_ref()
            .and_then(|c| c.transport.round_trip_latency())
    }

    pub fn identity(&self) -> Option<AccountIdentity> {
        self.connection.read().as_ref().map(|c| c.identity.clone())
    }

    /// Configured delay, floored at the minimum publish interval.
    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.config.delay_secs()).max(self.deps.timings.min_publish_interval)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let backoff = self.backoff.lock().clone();
        SessionSnapshot {
            holder: self.holder.clone(),
            credential: self.credential.mask(),
            state: self.state(),
            connection: self.connection_status(),
            latency: self.latency(),
            restart_count: backoff.restart_count(),
            last_restart: backoff.last_restart(),
            cooldown_until: backoff.cooldown_until(),
            publish_count: self.publish_count(),
            next: *self.next.read(),
            cursors: self.cursors.lock().positions(),
        }
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.write();
        if *current == SessionState::Terminated {
            return;
        }
        trace!("(Session) {} {} -> {}", self.label, *current, state);
        *current = state;
    }

    /// Connects and starts the publish loop.
    pub async fn start(self: &Arc<Self>) -> Result<AccountIdentity, Error> {
        let identity = self.open().await?;
        self.spawn_loop();
        Ok(identity)
    }

    /// Performs the handshake without starting the loop.
    pub async fn open(&self) -> Result<AccountIdentity, Error> {
        if !self.credential.is_well_formed() {
            self.set_state(SessionState::Terminated);
            return Err(Error::Auth(format!(
                "malformed credential {}",
                self.credential.mask()
            )));
        }
        self.set_state(SessionState::Connecting);
        match self.connect_transport().await {
            Ok(identity) => {
                self.set_state(SessionState::Ready);
                Ok(identity)
            }
            Err(e) => {
                self.set_state(SessionState::Terminated);
                Err(e)
            }
        }
    }

    async fn connect_transport(&self) -> Result<AccountIdentity, Error> {
        let transport = self.deps.transports.create();
        let handshake = timeout(
            self.deps.timings.handshake_timeout,
            transport.connect(&self.credential),
        )
        .await;

        let identity = match handshake {
            Ok(Ok(identity)) => identity,
            Ok(Err(e)) => {
                let _ = transport.disconnect().await;
                return Err(e);
            }
            Err(elapsed) => {
                let _ = transport.disconnect().await;
                return Err(Error::Timeout(elapsed));
            }
        };

        info!("(Session) {} logged in as '{}'", self.label, identity.username);
        let events = self.cancel.child_token();
        self.watch_events(&transport, events.clone());
        *self.connection.write() = Some(Connection {
            transport,
            identity: identity.clone(),
            connected_at: Instant::now(),
            events,
        });
        Ok(identity)
    }

    fn watch_events(&self, transport: &Arc<dyn PresenceTransport>, token: CancellationToken) {
        let mut rx = transport.subscribe();
        let label = self.label.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    ev = rx.recv() => match ev {
                        Ok(TransportEvent::Ready) => debug!("(Session) {} ready", label),
                        Ok(TransportEvent::Disconnected) => info!("(Session) client disconnected for {}", label),
                        Ok(TransportEvent::Reconnecting) => info!("(Session) client reconnecting for {}", label),
                        Ok(TransportEvent::Resumed) => info!("(Session) client resumed for {}", label),
                        Ok(TransportEvent::Error(e)) => warn!("(Session) client error for {}: {}", label, e),
                        Err(RecvError::Lagged(n)) => trace!("(Session) {} skipped {} events", label, n),
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });
    }

    async fn close_connection(&self) {
        let old = self.connection.write().take();
        if let Some(conn) = old {
            conn.events.cancel();
            if let Err(e) = conn.transport.disconnect().await {
                debug!("(Session) {} disconnect error: {:?}", self.label, e);
            }
        }
    }

    pub fn spawn_loop(self: &Arc<Self>) {
        let weather = Arc::clone(&self.weather);
        weather.spawn_polling(self.cancel.child_token());

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.task.lock() = Some(handle);
    }

    async fn run(self: Arc<Self>) {
        let mut next = Scheduled::new(Wake::Publish, Duration::ZERO);
        loop {
            *self.next.write() = Some(next);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sleep(next.delay) => {}
            }
            next = match next.wake {
                Wake::Publish => self.tick().await,
                Wake::Reconnect => self.reconnect().await,
                Wake::CoolDown => {
                    self.backoff.lock().end_cooldown();
                    info!("(Session) cooldown over for {}, reconnecting", self.label);
                    self.reconnect().await
                }
            };
            if self.is_terminated() {
                break;
            }
        }
        *self.next.write() = None;
    }

    /// One firing of the publish timer: health check, then publish.
    pub async fn tick(&self) -> Scheduled {
        let interval = self.publish_interval();
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("(Session) streaming update already in progress for {}", self.label);
            return Scheduled::new(Wake::Publish, interval);
        };

        if let Some(reason) = self.degradation() {
            return self.on_degraded(&reason);
        }
        if self.backoff.lock().on_healthy() {
            info!("(Session) connection stabilized for {}", self.label);
        }

        self.set_state(SessionState::Publishing);
        let cycle = timeout(self.deps.timings.cycle_timeout, self.publish_cycle()).await;
        match cycle.map_err(Error::from).and_then(|r| r) {
            Ok(delay) => Scheduled::new(Wake::Publish, delay),
            Err(e) => {
                error!("(Session) publish cycle failed for {}: {:?}", self.label, e);
                Scheduled::new(Wake::Publish, self.deps.timings.error_retry)
            }
        }
    }

    /// Publishes once outside the timer. `Ok(false)` when a publish is
    /// already running.
    pub async fn publish_now(&self) -> Result<bool, Error> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("(Session) streaming update already in progress for {}", self.label);
            return Ok(false);
        };
        self.publish_cycle().await?;
        Ok(true)
    }

    fn degradation(&self) -> Option<String> {
        let conn = self.connection.read().clone();
        let Some(conn) = conn else {
            return Some("no open connection".to_string());
        };
        let status = conn.transport.connection_status();
        if !status.is_connected() {
            return Some(format!("not connected ({status:?})"));
        }
        match conn.transport.round_trip_latency() {
            Some(l) if l > self.deps.timings.latency_threshold => {
                Some(format!("high ping {}ms", l.as_millis()))
            }
            _ => None,
        }
    }

    fn on_degraded(&self, reason: &str) -> Scheduled {
        self.set_state(SessionState::Degraded);
        let interval = self.publish_interval();
        let (decision, count) = {
            let mut backoff = self.backoff.lock();
            let d = backoff.on_degraded(Instant::now(), interval, &self.deps.timings);
            (d, backoff.restart_count())
        };
        match decision {
            Decision::Reconnect(delay) => {
                warn!(
                    "(Session) connection issues for {} ({}), reconnection attempt #{} in {:?}",
                    self.label, reason, count, delay
                );
                self.set_state(SessionState::Reconnecting);
                Scheduled::new(Wake::Reconnect, delay)
            }
            Decision::CoolDown(delay) => {
                warn!(
                    "(Session) too many reconnection attempts for {}, pausing for {:?}",
                    self.label, delay
                );
                self.set_state(SessionState::CoolingDown);
                Scheduled::new(Wake::CoolDown, delay)
            }
        }
    }

    async fn reconnect(&self) -> Scheduled {
        self.set_state(SessionState::Reconnecting);
        self.close_connection().await;
        match self.connect_transport().await {
            Ok(_) => {
                self.set_state(SessionState::Ready);
                Scheduled::new(Wake::Publish, Duration::ZERO)
            }
            Err(e) if e.is_permanent() => {
                error!("(Session) credential rejected on reconnect for {}: {:?}", self.label, e);
                self.cancel.cancel();
                self.set_state(SessionState::Terminated);
                Scheduled::new(Wake::Publish, Duration::ZERO)
            }
            Err(e) => self.on_degraded(&format!("reconnect failed: {e}")),
        }
    }

    async fn publish_cycle(&self) -> Result<Duration, Error> {
        let conn = self
            .connection
            .read()
            .clone()
            .ok_or_else(|| Error::Platform("session has no open connection".into()))?;

        self.deps.system.refresh();
        let picks = self.picks();
        let ctx = build_context(&self.sources(&conn));
        let payload = self.assemble(&picks, &ctx).await;

        match conn.transport.publish(&payload).await {
            Ok(()) => {
                let n = self.publish_count.fetch_add(1, Ordering::AcqRel) + 1;
                trace!("(Session) {} published update #{}", self.label, n);
            }
            Err(e) => warn!("(Session) failed to update presence for {}: {:?}", self.label, e),
        }

        self.cursors.lock().advance_all();
        Ok(self.publish_interval())
    }

    fn picks(&self) -> Picks {
        let cfg = &*self.config;
        let c = self.cursors.lock();
        let text = |slot: Slot| c.pick(slot, cfg.text_slot(slot)).cloned();
        Picks {
            watch_url: text(Slot::WatchUrl),
            texts: [
                text(Slot::Text1),
                text(Slot::Text2),
                text(Slot::Text3),
                text(Slot::Text4),
            ],
            large: text(Slot::LargeImage),
            small: text(Slot::SmallImage),
            buttons: [Slot::Button1, Slot::Button2]
                .into_iter()
                .filter_map(|slot| c.pick(slot, cfg.button_slot(slot)).cloned())
                .collect(),
        }
    }

    fn sources(&self, conn: &Connection) -> VariableSources {
        let mut src = VariableSources::new(Utc::now());
        src.weather = self.weather.latest();
        src.system = self.deps.system.latest();
        src.identity = Some(conn.identity.clone());
        src.latency = conn.transport.round_trip_latency();
        src.uptime = conn.connected_at.elapsed();
        let transport = Arc::clone(&conn.transport);
        src.guilds = Some(Arc::new(move |id: &str| transport.guild(id)));
        src
    }

    async fn assemble(&self, picks: &Picks, ctx: &TemplateContext) -> PresencePayload {
        let render = |t: &Option<String>| {
            t.as_deref()
                .map(|s| render_str(s, ctx))
                .filter(|s| !s.is_empty())
        };

        let watch_url = match picks.watch_url.as_deref().filter(|u| is_http_url(u)) {
            Some(url) => url.to_string(),
            None => {
                warn!("(Session) no valid streaming URL for {}, using fallback", self.label);
                FALLBACK_WATCH_URL.to_string()
            }
        };

        let application_id = self
            .config
            .slots
            .options
            .application_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.deps.default_application_id.clone());

        let images = self.resolve_images(&application_id, picks, ctx).await;

        let mut buttons = Vec::new();
        for button in &picks.buttons {
            let label = render_str(&button.name, ctx);
            if label.is_empty() || !is_http_url(&button.url) {
                warn!("(Session) skipping button '{}' for {}: invalid label or url", label, self.label);
                continue;
            }
            buttons.push(PresenceButton { label, url: button.url.clone() });
        }

        PresencePayload {
            application_id,
            platform: StreamPlatform::from_url(&watch_url),
            watch_url,
            details: render(&picks.texts[0]),
            state: render(&picks.texts[1]),
            large_text: render(&picks.texts[2]),
            small_text: render(&picks.texts[3]),
            large_image: images.large,
            small_image: images.small,
            buttons,
            started_at: self.started_at,
        }
    }

    async fn resolve_images(&self, application_id: &str, picks: &Picks, ctx: &TemplateContext) -> ResolvedImages {
        if picks.large.is_none() && picks.small.is_none() {
            return ResolvedImages::default();
        }
        let expand = |raw: &Option<String>| {
            raw.as_deref()
                .map(|s| render_str(s, ctx))
                .filter(|s| !s.trim().is_empty())
        };
        let request = ImageRequest {
            application_id: application_id.to_string(),
            token: self.credential.value.clone(),
            large: expand(&picks.large),
            small: expand(&picks.small),
        };
        let key = (request.large.clone(), request.small.clone());

        match self.deps.images.resolve(&request).await {
            Ok(images) => self.deps.image_cache.merge(key, images),
            Err(e) => match self.deps.image_cache.get(&key) {
                Some(cached) => {
                    debug!("(Session) image resolution failed for {}, using cached: {:?}", self.label, e);
                    cached
                }
                None => {
                    warn!("(Session) failed to set images for {}: {:?}", self.label, e);
                    ResolvedImages::default()
                }
            },
        }
    }

    /// Cancels the loop and closes the transport. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(handle) = task {
            handle.abort();
        }
        self.close_connection().await;
        if !self.is_terminated() {
            self.set_state(SessionState::Terminated);
            info!("(Session) stopped stream for {}", self.label);
        }
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockImageResolver;
    use crate::test_utils::helpers::{session_deps, test_credential, FakeTransportFactory};

    fn config() -> Arc<PresenceConfig> {
        let mut cfg = PresenceConfig::default_document();
        cfg.setup.delay = 10;
        cfg.slots.options.watch_urls = vec!["https://www.youtube.com/watch?v=1".into(), "nope".into()];
        cfg.slots.text_1 = vec!["hi {user:name}".into(), "second".into()];
        cfg.slots.text_2 = Vec::new();
        cfg.slots.text_3 = vec!["".into()];
        cfg.slots.large_images = vec!["https://img.example/{user:name}.png".into()];
        cfg.slots.button_1 = vec![ButtonSpec { name: "site".into(), url: "https://example.com".into() }];
        cfg.slots.button_2 = vec![ButtonSpec { name: "bad".into(), url: "ftp://x".into() }];
        Arc::new(cfg)
    }

    #[tokio::test]
    async fn publish_builds_the_payload_and_advances() {
        let factory = FakeTransportFactory::healthy();
        let mut resolver = MockImageResolver::new();
        resolver
            .expect_resolve()
            .withf(|req| req.large.as_deref() == Some("https://img.example/tester.png"))
            .returning(|req| Ok(ResolvedImages { large: req.large.clone().map(|l| format!("mp:{l}")), small: None }));

        let deps = session_deps(factory.clone(), Arc::new(resolver));
        let session = Session::new("holder", test_credential(1), config(), deps);
        session.open().await.expect("open");

        assert!(session.publish_now().await.expect("publish"));
        let first = factory.last_payload().expect("payload");
        assert_eq!(first.platform, StreamPlatform::YouTube);
        assert_eq!(first.details.as_deref(), Some("hi tester"));
        assert_eq!(first.state, None);
        assert_eq!(first.large_text, None);
        assert_eq!(first.large_image.as_deref(), Some("mp:https://img.example/tester.png"));
        assert_eq!(first.buttons.len(), 1);
        assert_eq!(first.application_id, DEFAULT_APPLICATION_ID);

        assert!(session.publish_now().await.expect("publish"));
        let second = factory.last_payload().expect("payload");
        assert_eq!(second.details.as_deref(), Some("second"));
        assert_eq!(second.watch_url, FALLBACK_WATCH_URL);
        assert_eq!(second.platform, StreamPlatform::Twitch);
        assert_eq!(session.publish_count(), 2);
    }

    #[tokio::test]
    async fn image_failure_falls_back_to_cache() {
        let factory = FakeTransportFactory::healthy();
        let mut resolver = MockImageResolver::new();
        let mut calls = 0;
        resolver.expect_resolve().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(ResolvedImages { large: Some("mp:cached".into()), small: None })
            } else {
                Err(Error::Platform("assets endpoint down".into()))
            }
        });

        let deps = session_deps(factory.clone(), Arc::new(resolver));
        let session = Session::new("holder", test_credential(2), config(), deps);
        session.open().await.expect("open");

        session.publish_now().await.expect("first");
        session.publish_now().await.expect("second");
        let payload = factory.last_payload().expect("payload");
        assert_eq!(payload.large_image.as_deref(), Some("mp:cached"));
    }

    #[tokio::test]
    async fn shared_image_cache_is_not_crossed_between_accounts() {
        let factory = FakeTransportFactory::healthy();
        let mut resolver = MockImageResolver::new();
        let mut calls = 0;
        resolver.expect_resolve().returning(move |req| {
            calls += 1;
            if calls == 1 {
                Ok(ResolvedImages { large: req.large.clone().map(|l| format!("mp:{l}")), small: None })
            } else {
                Err(Error::Platform("assets endpoint down".into()))
            }
        });

        let deps = session_deps(factory.clone(), Arc::new(resolver));
        let cfg = Arc::new(PresenceConfig::default_document());
        let first = Session::new("holder", test_credential(1), Arc::clone(&cfg), deps.clone());
        let second = Session::new("holder", test_credential(2), cfg, deps);
        first.open().await.expect("open first");
        second.open().await.expect("open second");

        first.publish_now().await.expect("first publish");
        assert_eq!(
            factory.last_payload().expect("payload").large_image.as_deref(),
            Some("mp:https://cdn.example/avatar1.png")
        );

        second.publish_now().await.expect("second publish");
        assert_eq!(factory.last_payload().expect("payload").large_image, None);
    }

    #[tokio::test]
    async fn partial_image_answer_keeps_the_cached_reference() {
        let factory = FakeTransportFactory::healthy();
        let mut resolver = MockImageResolver::new();
        let mut calls = 0;
        resolver.expect_resolve().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(ResolvedImages { large: Some("mp:cached".into()), small: None })
            } else {
                Ok(ResolvedImages::default())
            }
        });

        let deps = session_deps(factory.clone(), Arc::new(resolver));
        let session = Session::new("holder", test_credential(3), config(), deps);
        session.open().await.expect("open");

        session.publish_now().await.expect("first");
        session.publish_now().await.expect("second");
        let payload = factory.last_payload().expect("payload");
        assert_eq!(payload.large_image.as_deref(), Some("mp:cached"));
    }

    #[tokio::test]
    async fn malformed_credential_never_connects() {
        let factory = FakeTransportFactory::healthy();
        let deps = session_deps(factory.clone(), Arc::new(MockImageResolver::new()));
        let session = Session::new("holder", Credential::new("not-a-token"), config(), deps);
        assert!(matches!(session.open().await, Err(Error::Auth(_))));
        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(factory.created(), 0);
    }
}
