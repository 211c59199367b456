use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque account token owned by a holder. Never mutated, only added or removed.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    pub value: String,
    #[serde(rename = "addedAt", default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            added_at: Utc::now(),
        }
    }

    /// Three non-empty, dot-separated segments of `[A-Za-z0-9_-]`.
    pub fn is_well_formed(&self) -> bool {
        let trimmed = self.value.trim();
        let segments: Vec<&str> = trimmed.split('.').collect();
        segments.len() == 3
            && segments.iter().all(|seg| {
                !seg.is_empty()
                    && seg
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            })
    }

    /// Log-safe rendering of the token.
    pub fn mask(&self) -> String {
        mask_token(&self.value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &self.mask())
            .field("added_at", &self.added_at)
            .finish()
    }
}

/// Keeps the first segment (the encoded account id) and hides the rest.
pub fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return "INVALID_TOKEN".to_string();
    }
    match token.split_once('.') {
        Some((head, _)) => format!("{head}.##########"),
        None => {
            let prefix: String = token.chars().take(10).collect();
            format!("{prefix}...")
        }
    }
}

/// The stored record for one account holder.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HolderCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub tokens: Vec<Credential>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_requires_three_segments() {
        assert!(Credential::new("abc.def.ghi").is_well_formed());
        assert!(Credential::new("  MTA-x.Y_z.123  ").is_well_formed());
        assert!(!Credential::new("abc.def").is_well_formed());
        assert!(!Credential::new("abc..ghi").is_well_formed());
        assert!(!Credential::new("a b.c.d").is_well_formed());
        assert!(!Credential::new("").is_well_formed());
    }

    #[test]
    fn masking_hides_the_secret() {
        assert_eq!(mask_token("head.secret.sig"), "head.##########");
        assert_eq!(mask_token("nodotsatallhere"), "nodotsatal...");
        assert_eq!(mask_token(""), "INVALID_TOKEN");

        let debug = format!("{:?}", Credential::new("head.secret.sig"));
        assert!(!debug.contains("secret"));
    }
}
