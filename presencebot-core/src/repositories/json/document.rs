// presencebot-core/src/repositories/json/document.rs

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Error;

/// A JSON file held in memory and written back whole on every change.
pub struct JsonDocument<T> {
    path: PathBuf,
    data: RwLock<T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync,
{
    /// Loads `path`, creating it with the default value when missing.
    /// An unreadable or corrupt file is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let data = match fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => T::default(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let data = T::default();
                write_atomic(&path, &data).await?;
                info!("Created new {}", path.display());
                data
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.data.read().await;
        f(&guard)
    }

    /// Applies `f` to a copy and persists it. When `f` reports no change
    /// (`changed == false`) nothing is written. The in-memory value only
    /// moves once the file has been replaced.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> (R, bool)) -> Result<R, Error> {
        let mut guard = self.data.write().await;
        let mut next = guard.clone();
        let (result, changed) = f(&mut next);
        if changed {
            write_atomic(&self.path, &next).await?;
            *guard = next;
            debug!("Saved {}", self.path.display());
        }
        Ok(result)
    }
}

async fn write_atomic<T: Serialize>(path: &Path, data: &T) -> Result<(), Error> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).await?;
        }
    }
    let body = serde_json::to_string_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use tokio_test::assert_ok;

    type Doc = BTreeMap<String, u32>;

    #[tokio::test]
    async fn missing_file_is_created_with_the_default() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("doc.json");

        let doc = assert_ok!(JsonDocument::<Doc>::open(&path).await);
        assert!(doc.read(|d| d.is_empty()).await);
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = JsonDocument::<Doc>::open(&path).await;
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn unchanged_updates_are_not_written() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("doc.json");
        let doc = JsonDocument::<Doc>::open(&path).await.unwrap();

        assert_ok!(doc.update(|d| ((), d.insert("a".into(), 1).is_none())).await);
        std::fs::write(&path, "{}").unwrap();
        assert_ok!(doc.update(|_| ((), false)).await);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");

        assert_ok!(doc.update(|d| ((), d.insert("b".into(), 2).is_none())).await);
        let reopened = JsonDocument::<Doc>::open(&path).await.unwrap();
        assert_eq!(reopened.read(|d| d.len()).await, 2);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_untouched() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("doc.json");
        let doc = JsonDocument::<Doc>::open(&path).await.unwrap();
        assert_ok!(doc.update(|d| ((), d.insert("a".into(), 1).is_none())).await);

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), "x").unwrap();

        let result = doc.update(|d| ((), d.insert("b".into(), 2).is_none())).await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(doc.read(|d| d.keys().cloned().collect::<Vec<_>>()).await, vec!["a".to_string()]);
    }
}
