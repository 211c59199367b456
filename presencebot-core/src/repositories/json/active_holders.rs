use std::path::PathBuf;

use async_trait::async_trait;

use presencebot_common::traits::repository_traits::ActiveHolderStore;

use super::document::JsonDocument;
use crate::Error;

/// Plain JSON array of holder ids.
pub struct JsonActiveHolderStore {
    doc: JsonDocument<Vec<String>>,
}

impl JsonActiveHolderStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        Ok(Self { doc: JsonDocument::open(path).await? })
    }
}

#[async_trait]
impl ActiveHolderStore for JsonActiveHolderStore {
    async fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.doc.read(|d| d.clone()).await)
    }

    async fn add(&self, holder: &str) -> Result<(), Error> {
        self.doc
            .update(|d| {
                if d.iter().any(|h| h == holder) {
                    return ((), false);
                }
                d.push(holder.to_string());
                ((), true)
            })
            .await
    }

    async fn remove(&self, holder: &str) -> Result<(), Error> {
        self.doc
            .update(|d| {
                let before = d.len();
                d.retain(|h| h != holder);
                ((), d.len() != before)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn add_is_idempotent_and_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("activeStreams.json");

        let store = JsonActiveHolderStore::open(&path).await.unwrap();
        store.add("1").await.unwrap();
        store.add("1").await.unwrap();
        store.add("2").await.unwrap();
        store.remove("1").await.unwrap();

        let reopened = JsonActiveHolderStore::open(&path).await.unwrap();
        assert_eq!(reopened.list().await.unwrap(), vec!["2".to_string()]);
    }
}
