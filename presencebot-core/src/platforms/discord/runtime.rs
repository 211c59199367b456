// File: presencebot-core/src/platforms/discord/runtime.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{
    CloseFrame, Event, EventTypeFlags, Intents, MessageSender, Shard, ShardId, StreamExt,
};
use twilight_model::gateway::payload::incoming::Ready as ReadyPayload;
use twilight_model::id::marker::GuildMarker;
use twilight_model::id::Id;

use presencebot_common::models::{AccountIdentity, Credential, GuildSummary, PresencePayload};

use crate::platforms::{ConnectionStatus, PresenceTransport, TransportEvent, TransportFactory};
use crate::Error;

const CDN_BASE: &str = "https://cdn.discordapp.com";
const READY_TIMEOUT: Duration = Duration::from_secs(30);
/// Gateway close code for a rejected token.
const AUTHENTICATION_FAILED: u16 = 4004;
const OP_PRESENCE_UPDATE: u8 = 3;
const ACTIVITY_STREAMING: u8 = 1;

type ReadySignal = oneshot::Sender<Result<AccountIdentity, Error>>;

fn put(map: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
        map.insert(key.to_string(), json!(v));
    }
}

/// Builds the raw gateway presence-update command for a streaming activity.
/// Empty or missing fields are left out.
pub fn presence_command(payload: &PresencePayload) -> Value {
    let mut activity = Map::new();
    activity.insert("type".into(), json!(ACTIVITY_STREAMING));
    activity.insert("name".into(), json!(payload.platform.to_string()));
    activity.insert("url".into(), json!(payload.watch_url));
    activity.insert("application_id".into(), json!(payload.application_id));

    put(&mut activity, "details", &payload.details);
    put(&mut activity, "state", &payload.state);

    let mut assets = Map::new();
    put(&mut assets, "large_image", &payload.large_image);
    put(&mut assets, "large_text", &payload.large_text);
    put(&mut assets, "small_image", &payload.small_image);
    put(&mut assets, "small_text", &payload.small_text);
    if !assets.is_empty() {
        activity.insert("assets".into(), Value::Object(assets));
    }

    if !payload.buttons.is_empty() {
        let labels: Vec<&str> = payload.buttons.iter().map(|b| b.label.as_str()).collect();
        let urls: Vec<&str> = payload.buttons.iter().map(|b| b.url.as_str()).collect();
        activity.insert("buttons".into(), json!(labels));
        activity.insert("metadata".into(), json!({ "button_urls": urls }));
    }

    activity.insert(
        "timestamps".into(),
        json!({ "start": payload.started_at.timestamp_millis() }),
    );

    json!({
        "op": OP_PRESENCE_UPDATE,
        "d": {
            "since": 0,
            "activities": [Value::Object(activity)],
            "status": "online",
            "afk": false,
        }
    })
}

fn identity_from_ready(data: &ReadyPayload) -> AccountIdentity {
    let user = &data.user;
    AccountIdentity {
        user_id: user.id.to_string(),
        username: user.name.clone(),
        avatar_url: user
            .avatar
            .map(|hash| format!("{CDN_BASE}/avatars/{}/{hash}.png", user.id)),
        banner_url: user
            .banner
            .map(|hash| format!("{CDN_BASE}/banners/{}/{hash}.png", user.id)),
    }
}

struct ShardState {
    status: Arc<RwLock<ConnectionStatus>>,
    latency_ms: Arc<AtomicU64>,
    cache: Arc<InMemoryCache>,
    events: broadcast::Sender<TransportEvent>,
}

/// Drives one shard until it closes:
///   - keeps the guild cache and latency current
///   - answers the pending handshake on READY
///   - forwards lifecycle changes to subscribers
async fn shard_runner(mut shard: Shard, state: ShardState, ready_tx: ReadySignal) {
    let shard_id = shard.id().number();
    let mut ready_tx = Some(ready_tx);
    info!("(ShardRunner) Shard {shard_id} started. Waiting for READY.");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        if let Some(avg) = shard.latency().average() {
            state.latency_ms.store(avg.as_millis().max(1) as u64, Ordering::Relaxed);
        }

        let event = match item {
            Ok(event) => event,
            Err(err) => {
                error!("(ShardRunner) Shard {shard_id} => error receiving event: {err:?}");
                let _ = state.events.send(TransportEvent::Error(err.to_string()));
                continue;
            }
        };
        state.cache.update(&event);

        match &event {
            Event::Ready(ready) => {
                let data: &ReadyPayload = ready;
                info!(
                    "(ShardRunner) Shard {shard_id} => READY as {} (ID={})",
                    data.user.name, data.user.id
                );
                *state.status.write() = ConnectionStatus::Connected;
                let identity = identity_from_ready(data);
                match ready_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(Ok(identity));
                    }
                    None => {
                        let _ = state.events.send(TransportEvent::Ready);
                    }
                }
            }
            Event::Resumed => {
                *state.status.write() = ConnectionStatus::Connected;
                let _ = state.events.send(TransportEvent::Resumed);
            }
            Event::GatewayReconnect => {
                *state.status.write() = ConnectionStatus::Reconnecting;
                let _ = state.events.send(TransportEvent::Reconnecting);
            }
            Event::GatewayClose(frame) => {
                let code = frame.as_ref().map(|f| f.code);
                if code == Some(AUTHENTICATION_FAILED) {
                    warn!("(ShardRunner) Shard {shard_id} => token rejected by gateway");
                    *state.status.write() = ConnectionStatus::Error("authentication failed".into());
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(Err(Error::Auth("token rejected by gateway".into())));
                    }
                    let _ = state.events.send(TransportEvent::Error("authentication failed".into()));
                    break;
                }
                debug!("(ShardRunner) Shard {shard_id} => gateway closed (code={code:?})");
                *state.status.write() = ConnectionStatus::Disconnected;
                let _ = state.events.send(TransportEvent::Disconnected);
            }
            _ => {
                trace!("(ShardRunner) Shard {shard_id} => unhandled event: {:?}", event.kind());
            }
        }
    }

    {
        let mut status = state.status.write();
        if !matches!(*status, ConnectionStatus::Error(_)) {
            *status = ConnectionStatus::Closed;
        }
    }
    if let Some(tx) = ready_tx.take() {
        let _ = tx.send(Err(Error::Platform("gateway closed before READY".into())));
    }
    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

/// A single gateway connection carrying one account's presence.
pub struct DiscordTransport {
    status: Arc<RwLock<ConnectionStatus>>,
    latency_ms: Arc<AtomicU64>,
    cache: Arc<InMemoryCache>,
    events: broadcast::Sender<TransportEvent>,
    sender: Mutex<Option<MessageSender>>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl DiscordTransport {
    pub fn new() -> Self {
        let cache = InMemoryCache::builder()
            .resource_types(ResourceType::GUILD)
            .build();
        let (events, _) = broadcast::channel(32);
        Self {
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            latency_ms: Arc::new(AtomicU64::new(0)),
            cache: Arc::new(cache),
            events,
            sender: Mutex::new(None),
            runner: Mutex::new(None),
        }
    }
}

impl Default for DiscordTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceTransport for DiscordTransport {
    async fn connect(&self, credential: &Credential) -> Result<AccountIdentity, Error> {
        if self.connection_status().is_connected() {
            return Err(Error::Platform("transport is already connected".into()));
        }
        let token = credential.value.trim().to_string();
        if token.is_empty() {
            return Err(Error::Auth("Discord token is empty".into()));
        }

        let shard = Shard::new(ShardId::ONE, token, Intents::GUILDS);
        *self.sender.lock() = Some(shard.sender());
        *self.status.write() = ConnectionStatus::Reconnecting;

        let (ready_tx, ready_rx) = oneshot::channel();
        let state = ShardState {
            status: Arc::clone(&self.status),
            latency_ms: Arc::clone(&self.latency_ms),
            cache: Arc::clone(&self.cache),
            events: self.events.clone(),
        };
        let handle = tokio::spawn(shard_runner(shard, state, ready_tx));
        *self.runner.lock() = Some(handle);

        match timeout(READY_TIMEOUT, ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Platform("shard runner dropped before READY".into())),
            Err(elapsed) => {
                let _ = self.disconnect().await;
                Err(Error::Timeout(elapsed))
            }
        }
    }

    async fn disconnect(&self) -> Result<(), Error> {
        *self.status.write() = ConnectionStatus::Closed;
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        if let Some(handle) = self.runner.lock().take() {
            handle.abort();
        }
        Ok(())
    }

    async fn publish(&self, payload: &PresencePayload) -> Result<(), Error> {
        let guard = self.sender.lock();
        let sender = guard
            .as_ref()
            .ok_or_else(|| Error::Platform("transport is not connected".into()))?;
        sender
            .send(presence_command(payload).to_string())
            .map_err(|e| Error::Platform(format!("presence send failed: {e}")))
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.status.read().clone()
    }

    fn round_trip_latency(&self) -> Option<Duration> {
        match self.latency_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn guild(&self, id: &str) -> Option<GuildSummary> {
        let raw: u64 = id.trim().parse().ok()?;
        let guild_id: Id<GuildMarker> = Id::new_checked(raw)?;
        let guild = self.cache.guild(guild_id)?;
        Some(GuildSummary {
            name: guild.name().to_string(),
            member_count: guild.member_count(),
            icon_url: guild
                .icon()
                .map(|hash| format!("{CDN_BASE}/icons/{guild_id}/{hash}.png")),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiscordTransportFactory;

impl TransportFactory for DiscordTransportFactory {
    fn create(&self) -> Arc<dyn PresenceTransport> {
        Arc::new(DiscordTransport::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use presencebot_common::models::{PresenceButton, StreamPlatform};

    fn payload() -> PresencePayload {
        PresencePayload {
            application_id: "42".into(),
            watch_url: "https://www.twitch.tv/someone".into(),
            platform: StreamPlatform::Twitch,
            details: Some("Playing".into()),
            state: Some(String::new()),
            large_text: None,
            small_text: Some("small".into()),
            large_image: Some("mp:external/a".into()),
            small_image: None,
            buttons: vec![PresenceButton { label: "Watch".into(), url: "https://a.example".into() }],
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn presence_command_shape() {
        let cmd = presence_command(&payload());
        assert_eq!(cmd["op"], 3);
        let activity = &cmd["d"]["activities"][0];
        assert_eq!(activity["type"], 1);
        assert_eq!(activity["name"], "Twitch");
        assert_eq!(activity["url"], "https://www.twitch.tv/someone");
        assert_eq!(activity["application_id"], "42");
        assert_eq!(activity["details"], "Playing");
        assert!(activity.get("state").is_none());
        assert_eq!(activity["assets"]["large_image"], "mp:external/a");
        assert!(activity["assets"].get("large_text").is_none());
        assert_eq!(activity["buttons"][0], "Watch");
        assert_eq!(activity["metadata"]["button_urls"][0], "https://a.example");
        assert_eq!(activity["timestamps"]["start"], 1_704_067_200_000i64);
        assert_eq!(cmd["d"]["status"], "online");
    }

    #[test]
    fn no_buttons_and_no_assets_are_omitted() {
        let mut p = payload();
        p.buttons.clear();
        p.large_image = None;
        p.small_text = None;
        let cmd = presence_command(&p);
        let activity = &cmd["d"]["activities"][0];
        assert!(activity.get("buttons").is_none());
        assert!(activity.get("metadata").is_none());
        assert!(activity.get("assets").is_none());
    }

    #[tokio::test]
    async fn fresh_transport_is_idle() {
        let transport = DiscordTransport::new();
        assert_eq!(transport.connection_status(), ConnectionStatus::Disconnected);
        assert!(transport.round_trip_latency().is_none());
        assert!(transport.guild("not-a-number").is_none());
        assert!(transport.guild("0").is_none());
        assert!(transport.publish(&payload()).await.is_err());
    }
}
