// File: presencebot-common/src/models/presence.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Category label derived from the watch target's host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamPlatform {
    Twitch,
    YouTube,
    Unknown,
}

impl StreamPlatform {
    pub fn from_url(url: &str) -> Self {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));
        match host.as_deref() {
            Some(h) if h == "twitch.tv" || h.ends_with(".twitch.tv") => StreamPlatform::Twitch,
            Some(h)
                if h == "youtube.com"
                    || h.ends_with(".youtube.com")
                    || h == "youtu.be" =>
            {
                StreamPlatform::YouTube
            }
            _ => StreamPlatform::Unknown,
        }
    }
}

impl fmt::Display for StreamPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamPlatform::Twitch => write!(f, "Twitch"),
            StreamPlatform::YouTube => write!(f, "YouTube"),
            StreamPlatform::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceButton {
    pub label: String,
    pub url: String,
}

/// One rendered presence update, ready to go over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub application_id: String,
    pub watch_url: String,
    pub platform: StreamPlatform,
    pub details: Option<String>,
    pub state: Option<String>,
    pub large_text: Option<String>,
    pub small_text: Option<String>,
    pub large_image: Option<String>,
    pub small_image: Option<String>,
    pub buttons: Vec<PresenceButton>,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_is_taken_from_the_host() {
        assert_eq!(StreamPlatform::from_url("https://www.twitch.tv/someone"), StreamPlatform::Twitch);
        assert_eq!(StreamPlatform::from_url("https://twitch.tv/someone"), StreamPlatform::Twitch);
        assert_eq!(StreamPlatform::from_url("https://youtu.be/abc"), StreamPlatform::YouTube);
        assert_eq!(StreamPlatform::from_url("https://m.youtube.com/watch?v=1"), StreamPlatform::YouTube);
        assert_eq!(StreamPlatform::from_url("https://kick.com/x"), StreamPlatform::Unknown);
        assert_eq!(StreamPlatform::from_url("not a url"), StreamPlatform::Unknown);
        assert_eq!(StreamPlatform::YouTube.to_string(), "YouTube");
    }
}
