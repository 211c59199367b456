// File: presencebot-common/src/models/presence_config.rs

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Publish interval used when the stored delay is not a usable number.
pub const DEFAULT_DELAY_SECS: u64 = 10;

/// Serialized size at which a config gets trimmed before use.
pub const OVERSIZED_CONFIG_BYTES: usize = 100_000;
const OVERSIZED_MAX_LARGE_IMAGES: usize = 10;
const OVERSIZED_MAX_SECONDARY_TEXTS: usize = 20;

/// One link button shown under the activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// Every rotating content array of a config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    WatchUrl,
    Text1,
    Text2,
    Text3,
    Text4,
    LargeImage,
    SmallImage,
    Button1,
    Button2,
}

impl Slot {
    pub const ALL: [Slot; 9] = [
        Slot::WatchUrl,
        Slot::Text1,
        Slot::Text2,
        Slot::Text3,
        Slot::Text4,
        Slot::LargeImage,
        Slot::SmallImage,
        Slot::Button1,
        Slot::Button2,
    ];

    /// Key used in the JSON document.
    pub fn key(&self) -> &'static str {
        match self {
            Slot::WatchUrl => "watch-url",
            Slot::Text1 => "text-1",
            Slot::Text2 => "text-2",
            Slot::Text3 => "text-3",
            Slot::Text4 => "text-4",
            Slot::LargeImage => "bigimg",
            Slot::SmallImage => "smallimg",
            Slot::Button1 => "button-1",
            Slot::Button2 => "button-2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSetup {
    #[serde(default)]
    pub city: String,

    /// Seconds between two publish ticks. Zero means "missing".
    #[serde(default, deserialize_with = "lenient_delay")]
    pub delay: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for PresenceSetup {
    fn default() -> Self {
        Self {
            city: String::new(),
            delay: DEFAULT_DELAY_SECS,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceOptions {
    #[serde(rename = "watch-url", default)]
    pub watch_urls: Vec<String>,

    /// Application the activity is attributed to.
    #[serde(rename = "botid", default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceSlots {
    #[serde(default)]
    pub options: PresenceOptions,
    #[serde(rename = "text-1", default)]
    pub text_1: Vec<String>,
    #[serde(rename = "text-2", default)]
    pub text_2: Vec<String>,
    #[serde(rename = "text-3", default)]
    pub text_3: Vec<String>,
    #[serde(rename = "text-4", default)]
    pub text_4: Vec<String>,
    #[serde(rename = "bigimg", default)]
    pub large_images: Vec<String>,
    #[serde(rename = "smallimg", default)]
    pub small_images: Vec<String>,
    #[serde(rename = "button-1", default)]
    pub button_1: Vec<ButtonSpec>,
    #[serde(rename = "button-2", default)]
    pub button_2: Vec<ButtonSpec>,
}

/// A holder's presence configuration, in the stored document shape
/// (`{"setup": {...}, "config": {...}}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default)]
    pub setup: PresenceSetup,
    #[serde(rename = "config", default)]
    pub slots: PresenceSlots,
}

impl PresenceConfig {
    /// Parses and validates a JSON document, normalizing `city`.
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(raw)?;
        if value.get("setup").is_none() || value.get("config").is_none() {
            return Err(Error::Config(
                "Missing required 'setup' or 'config' sections".into(),
            ));
        }
        let mut config: PresenceConfig = serde_json::from_value(value)?;
        config.setup.city = config.setup.city.trim().to_string();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.setup.city.trim().is_empty() || self.setup.delay == 0 {
            return Err(Error::Config(
                "Setup section missing required fields (city, delay)".into(),
            ));
        }
        if self.slots.options.watch_urls.is_empty() {
            return Err(Error::Config("watch-url must be a non-empty array".into()));
        }
        Ok(())
    }

    /// Number of entries configured for `slot`.
    pub fn slot_len(&self, slot: Slot) -> usize {
        let s = &self.slots;
        match slot {
            Slot::WatchUrl => s.options.watch_urls.len(),
            Slot::Text1 => s.text_1.len(),
            Slot::Text2 => s.text_2.len(),
            Slot::Text3 => s.text_3.len(),
            Slot::Text4 => s.text_4.len(),
            Slot::LargeImage => s.large_images.len(),
            Slot::SmallImage => s.small_images.len(),
            Slot::Button1 => s.button_1.len(),
            Slot::Button2 => s.button_2.len(),
        }
    }

    /// Text-valued slots; buttons have their own accessor.
    pub fn text_slot(&self, slot: Slot) -> &[String] {
        let s = &self.slots;
        match slot {
            Slot::WatchUrl => &s.options.watch_urls,
            Slot::Text1 => &s.text_1,
            Slot::Text2 => &s.text_2,
            Slot::Text3 => &s.text_3,
            Slot::Text4 => &s.text_4,
            Slot::LargeImage => &s.large_images,
            Slot::SmallImage => &s.small_images,
            Slot::Button1 | Slot::Button2 => &[],
        }
    }

    pub fn button_slot(&self, slot: Slot) -> &[ButtonSpec] {
        match slot {
            Slot::Button1 => &self.slots.button_1,
            Slot::Button2 => &self.slots.button_2,
            _ => &[],
        }
    }

    pub fn delay_secs(&self) -> u64 {
        if self.setup.delay == 0 {
            DEFAULT_DELAY_SECS
        } else {
            self.setup.delay
        }
    }

    /// Cuts the largest arrays of an oversized document. Returns true if
    /// anything was trimmed.
    pub fn trim_oversized(&mut self) -> bool {
        let size = serde_json::to_string(self).map(|s| s.len()).unwrap_or(0);
        if size < OVERSIZED_CONFIG_BYTES {
            return false;
        }
        self.slots.large_images.truncate(OVERSIZED_MAX_LARGE_IMAGES);
        self.slots.text_2.truncate(OVERSIZED_MAX_SECONDARY_TEXTS);
        true
    }

    /// The config handed out to holders that never uploaded their own.
    pub fn default_document() -> Self {
        Self {
            setup: PresenceSetup {
                city: "pattaya".into(),
                delay: DEFAULT_DELAY_SECS,
                proxy: None,
            },
            slots: PresenceSlots {
                options: PresenceOptions {
                    watch_urls: vec![
                        "https://www.twitch.tv/twitch".into(),
                        "https://www.youtube.com/watch?v=jfKfPfyJRdk".into(),
                    ],
                    application_id: None,
                },
                text_1: vec![
                    "{NF3( 〈 {emoji:time} {hour:1} : {min:1} 〉 ⭒ 〈 📆 {th=date} / {en=month:3} / {en=year:2} 〉 )}".into(),
                ],
                text_2: vec![
                    "{NF3(Loading..)}".into(),
                    "☆ | 💙 ╺  {user:name}  ྀི𓈒".into(),
                ],
                text_3: vec!["{city} {temp:c}°C ⭒ cpu {cpu:usage}% ⭒ ram {ram:usage}%".into()],
                text_4: Vec::new(),
                large_images: vec!["{user:icon}".into()],
                small_images: Vec::new(),
                button_1: Vec::new(),
                button_2: Vec::new(),
            },
        }
    }
}

/// Accepts a number, a numeric string, or anything else (which maps to the
/// default interval); `null` and `0` stay zero so validation can reject them.
fn lenient_delay<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => 0,
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f.round() as u64))
            .unwrap_or(0),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) if f > 0.0 => f.round() as u64,
            Ok(_) => 0,
            Err(_) => DEFAULT_DELAY_SECS,
        },
        Value::Bool(false) => 0,
        _ => DEFAULT_DELAY_SECS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "setup": { "city": "  pattaya ", "delay": "15" },
        "config": {
            "options": { "watch-url": ["https://www.twitch.tv/a"], "timestamp": "{start}" },
            "text-1": ["one", "two"],
            "button-1": [{ "name": "site", "url": "https://example.com" }]
        }
    }"#;

    #[test]
    fn parses_the_document_shape() {
        let cfg = PresenceConfig::from_json(SAMPLE).expect("valid config");
        assert_eq!(cfg.setup.city, "pattaya");
        assert_eq!(cfg.delay_secs(), 15);
        assert_eq!(cfg.slot_len(Slot::Text1), 2);
        assert_eq!(cfg.slot_len(Slot::Text2), 0);
        assert_eq!(cfg.slot_len(Slot::Button1), 1);
        assert_eq!(cfg.button_slot(Slot::Button1)[0].name, "site");
    }

    #[test]
    fn empty_watch_url_is_a_config_error() {
        let raw = r#"{"setup": {"city": "x", "delay": 10}, "config": {"options": {"watch-url": []}}}"#;
        match PresenceConfig::from_json(raw) {
            Err(Error::Config(msg)) => assert!(msg.contains("watch-url")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn missing_sections_and_fields_are_rejected() {
        assert!(matches!(
            PresenceConfig::from_json(r#"{"setup": {"city": "x", "delay": 1}}"#),
            Err(Error::Config(_))
        ));
        let no_delay = r#"{"setup": {"city": "x"}, "config": {"options": {"watch-url": ["https://a.b"]}}}"#;
        assert!(matches!(PresenceConfig::from_json(no_delay), Err(Error::Config(_))));
    }

    #[test]
    fn non_numeric_delay_falls_back_to_default() {
        let raw = r#"{"setup": {"city": "x", "delay": "soon"}, "config": {"options": {"watch-url": ["https://a.b"]}}}"#;
        let cfg = PresenceConfig::from_json(raw).expect("valid");
        assert_eq!(cfg.delay_secs(), DEFAULT_DELAY_SECS);
    }

    #[test]
    fn oversized_configs_are_trimmed() {
        let mut cfg = PresenceConfig::default_document();
        let filler = "x".repeat(2_000);
        cfg.slots.large_images = vec![filler.clone(); 40];
        cfg.slots.text_2 = vec![filler; 40];
        assert!(cfg.trim_oversized());
        assert_eq!(cfg.slots.large_images.len(), 10);
        assert_eq!(cfg.slots.text_2.len(), 20);

        let mut small = PresenceConfig::default_document();
        assert!(!small.trim_oversized());
    }

    #[test]
    fn default_document_is_valid() {
        assert!(PresenceConfig::default_document().validate().is_ok());
    }
}
