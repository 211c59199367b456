// File: presencebot-common/src/models/account.rs

use serde::{Deserialize, Serialize};

/// Who a session ended up logged in as, reported by the transport handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
}

/// Cached view of a guild the account belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSummary {
    pub name: String,
    pub member_count: Option<u64>,
    pub icon_url: Option<String>,
}
