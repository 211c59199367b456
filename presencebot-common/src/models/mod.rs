// File: presencebot-common/src/models/mod.rs
pub mod account;
pub mod credential;
pub mod presence;
pub mod presence_config;

pub use account::{AccountIdentity, GuildSummary};
pub use credential::{mask_token, Credential, HolderCredentials};
pub use presence::{PresenceButton, PresencePayload, StreamPlatform};
pub use presence_config::{ButtonSpec, PresenceConfig, PresenceOptions, PresenceSetup, PresenceSlots, Slot};
