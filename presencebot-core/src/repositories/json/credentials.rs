use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use presencebot_common::models::{Credential, HolderCredentials};
use presencebot_common::traits::repository_traits::CredentialStore;

use super::document::JsonDocument;
use crate::Error;

/// On-disk shape: `{"users": {"<holder>": {"username": .., "tokens": [..]}}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenDocument {
    #[serde(default)]
    pub users: BTreeMap<String, HolderCredentials>,
}

pub struct JsonCredentialStore {
    doc: JsonDocument<TokenDocument>,
}

impl JsonCredentialStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        Ok(Self { doc: JsonDocument::open(path).await? })
    }

    pub async fn count(&self, holder: &str) -> usize {
        self.doc
            .read(|d| d.users.get(holder).map_or(0, |h| h.tokens.len()))
            .await
    }
}

#[async_trait]
impl CredentialStore for JsonCredentialStore {
    async fn get(&self, holder: &str) -> Result<Vec<Credential>, Error> {
        Ok(self
            .doc
            .read(|d| d.users.get(holder).map(|h| h.tokens.clone()).unwrap_or_default())
            .await)
    }

    async fn exists(&self, holder: &str, value: &str) -> Result<bool, Error> {
        Ok(self
            .doc
            .read(|d| {
                d.users
                    .get(holder)
                    .is_some_and(|h| h.tokens.iter().any(|t| t.value == value))
            })
            .await)
    }

    async fn add(&self, holder: &str, username: &str, value: &str) -> Result<bool, Error> {
        let value = value.trim().to_string();
        self.doc
            .update(|d| {
                let entry = d
                    .users
                    .entry(holder.to_string())
                    .or_insert_with(|| HolderCredentials {
                        username: username.to_string(),
                        tokens: Vec::new(),
                    });
                if entry.tokens.iter().any(|t| t.value == value) {
                    return (false, false);
                }
                entry.tokens.push(Credential::new(value));
                (true, true)
            })
            .await
    }

    async fn remove(&self, holder: &str, value: &str) -> Result<bool, Error> {
        self.doc
            .update(|d| {
                let Some(entry) = d.users.get_mut(holder) else {
                    return (false, false);
                };
                let before = entry.tokens.len();
                entry.tokens.retain(|t| t.value != value);
                let removed = entry.tokens.len() != before;
                (removed, removed)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TOKEN: &str = "aaaa.bbbb.cccc";

    #[tokio::test]
    async fn add_get_remove_roundtrip_through_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("userTokens.json");

        let store = JsonCredentialStore::open(&path).await.expect("open");
        assert!(store.add("42", "ann", TOKEN).await.unwrap());
        assert!(!store.add("42", "ann", TOKEN).await.unwrap(), "duplicates are refused");
        assert!(store.exists("42", TOKEN).await.unwrap());

        let reopened = JsonCredentialStore::open(&path).await.expect("reopen");
        let tokens = reopened.get("42").await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value, TOKEN);

        assert!(reopened.remove("42", TOKEN).await.unwrap());
        assert!(!reopened.remove("42", TOKEN).await.unwrap());
        assert_eq!(reopened.count("42").await, 0);
        assert!(reopened.get("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_the_existing_file_format() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("userTokens.json");
        tokio::fs::write(
            &path,
            r#"{"users": {"7": {"username": "bo", "tokens": [{"value": "x.y.z", "addedAt": "2024-01-01T00:00:00.000Z"}]}}}"#,
        )
        .await
        .unwrap();

        let store = JsonCredentialStore::open(&path).await.expect("open");
        let tokens = store.get("7").await.unwrap();
        assert_eq!(tokens[0].value, "x.y.z");
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("userTokens.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(JsonCredentialStore::open(&path).await, Err(Error::Json(_))));
    }
}
