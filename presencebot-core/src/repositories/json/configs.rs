use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use presencebot_common::models::PresenceConfig;
use presencebot_common::traits::repository_traits::{ConfigLookup, ConfigStore};

use super::document::JsonDocument;
use crate::Error;

/// On-disk shape: `{"users": {"<holder>": <config document>}}`. Entries are
/// kept as raw JSON so a single bad entry cannot break the whole file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub users: BTreeMap<String, serde_json::Value>,
}

pub struct JsonConfigStore {
    doc: JsonDocument<ConfigDocument>,
}

impl JsonConfigStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        Ok(Self { doc: JsonDocument::open(path).await? })
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn get(&self, holder: &str) -> Result<ConfigLookup, Error> {
        let raw = self.doc.read(|d| d.users.get(holder).cloned()).await;
        let Some(raw) = raw else {
            return Ok(ConfigLookup {
                config: PresenceConfig::default_document(),
                is_default: true,
            });
        };
        match serde_json::from_value::<PresenceConfig>(raw) {
            Ok(config) => Ok(ConfigLookup { config, is_default: false }),
            Err(e) => {
                warn!("Stored config for '{}' is unreadable, using default: {:?}", holder, e);
                Ok(ConfigLookup {
                    config: PresenceConfig::default_document(),
                    is_default: true,
                })
            }
        }
    }

    async fn set(&self, holder: &str, config: &PresenceConfig) -> Result<(), Error> {
        config.validate()?;
        let value = serde_json::to_value(config)?;
        self.doc
            .update(|d| {
                d.users.insert(holder.to_string(), value);
                ((), true)
            })
            .await
    }
}
