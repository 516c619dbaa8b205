#[cfg(test)]
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::Mutex;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::PgStore;

/// The persisted documents, one key each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKey {
    Students,
    Subjects,
    Chapters,
    Work,
    Doubts,
}

impl CollectionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKey::Students => "sez.students",
            CollectionKey::Subjects => "sez.subjects",
            CollectionKey::Chapters => "sez.chapters",
            CollectionKey::Work => "sez.work",
            CollectionKey::Doubts => "sez.doubts",
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait KvStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Reads a document, falling back to `default` when it is absent, unreadable
/// or fails to parse. Never fails.
pub async fn load_or<S, T>(store: &S, key: CollectionKey, default: impl FnOnce() -> T) -> T
where
    S: KvStore,
    T: DeserializeOwned,
{
    match store.get(key.as_str()).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(key = key.as_str(), error = %err, "stored document failed to parse; using default");
                default()
            }
        },
        Ok(None) => {
            debug!(key = key.as_str(), "no stored document; using default");
            default()
        }
        Err(err) => {
            warn!(key = key.as_str(), error = %err, "failed to read stored document; using default");
            default()
        }
    }
}

pub async fn save<S, T>(store: &S, key: CollectionKey, value: &T) -> anyhow::Result<()>
where
    S: KvStore,
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)
        .with_context(|| format!("failed to serialize {}", key.as_str()))?;
    store.set(key.as_str(), &raw).await
}

/// One `<key>.json` file per document under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for FileStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create data directory {}", self.dir.display()))?;
        let path = self.path_for(key);
        tokio::fs::write(&path, value)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Process-local store, used by tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let values = self.values.lock().map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut values = self.values.lock().map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store selected at startup.
pub enum Backend {
    File(FileStore),
    Postgres(PgStore),
}

impl KvStore for Backend {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        match self {
            Backend::File(store) => store.get(key).await,
            Backend::Postgres(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        match self {
            Backend::File(store) => store.set(key, value).await,
            Backend::Postgres(store) => store.set(key, value).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_and_corrupt_documents_fall_back() {
        let store = MemoryStore::default();
        let empty: Vec<String> = load_or(&store, CollectionKey::Doubts, Vec::new).await;
        assert!(empty.is_empty());

        store.set("sez.doubts", "{not json").await.unwrap();
        let fallback: Vec<String> =
            load_or(&store, CollectionKey::Doubts, || vec!["seed".to_string()]).await;
        assert_eq!(fallback, ["seed"]);
    }

    #[tokio::test]
    async fn file_store_round_trips_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data"));

        assert_eq!(store.get("sez.work").await.unwrap(), None);
        save(&store, CollectionKey::Work, &vec!["w_1".to_string()]).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("data").join("sez.work.json")).unwrap();
        assert_eq!(raw, r#"["w_1"]"#);
        let loaded: Vec<String> = load_or(&store, CollectionKey::Work, Vec::new).await;
        assert_eq!(loaded, ["w_1"]);
    }
}
