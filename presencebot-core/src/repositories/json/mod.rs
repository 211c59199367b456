pub mod active_holders;
pub mod configs;
pub mod credentials;
pub mod document;

pub use active_holders::JsonActiveHolderStore;
pub use configs::JsonConfigStore;
pub use credentials::JsonCredentialStore;
pub use document::JsonDocument;

use std::path::Path;

pub const TOKENS_FILE: &str = "userTokens.json";
pub const CONFIGS_FILE: &str = "userConfig.json";
pub const ACTIVE_FILE: &str = "activeStreams.json";

/// The three stores, opened from one data directory.
pub struct JsonStores {
    pub credentials: JsonCredentialStore,
    pub configs: JsonConfigStore,
    pub active: JsonActiveHolderStore,
}

impl JsonStores {
    pub async fn open(data_dir: &Path) -> Result<Self, crate::Error> {
        Ok(Self {
            credentials: JsonCredentialStore::open(data_dir.join(TOKENS_FILE)).await?,
            configs: JsonConfigStore::open(data_dir.join(CONFIGS_FILE)).await?,
            active: JsonActiveHolderStore::open(data_dir.join(ACTIVE_FILE)).await?,
        })
    }
}
