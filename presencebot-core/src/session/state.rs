use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use presencebot_common::models::Slot;

use crate::platforms::ConnectionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Connecting,
    Ready,
    Publishing,
    Degraded,
    Reconnecting,
    CoolingDown,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What the session loop does when its timer fires next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Publish,
    Reconnect,
    CoolDown,
}

/// The pending timer of a session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub wake: Wake,
    pub delay: Duration,
}

impl Scheduled {
    pub fn new(wake: Wake, delay: Duration) -> Self {
        Self { wake, delay }
    }
}

/// Point-in-time view of a session, for status checks and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub holder: String,
    pub credential: String,
    pub state: SessionState,
    pub connection: ConnectionStatus,
    pub latency: Option<Duration>,
    pub restart_count: u32,
    pub last_restart: Option<Instant>,
    pub cooldown_until: Option<Instant>,
    pub publish_count: u64,
    pub next: Option<Scheduled>,
    pub cursors: HashMap<Slot, usize>,
}
