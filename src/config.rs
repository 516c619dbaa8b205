use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use crate::db::PgStore;
use crate::store::{Backend, FileStore};

pub const DEFAULT_DATA_DIR: &str = "tutor-desk-data";

/// Where desk documents live. Postgres wins when `DATABASE_URL` is set.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
}

impl StoreConfig {
    pub fn from_env(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            database_url: std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")
    }

    pub async fn open(&self) -> anyhow::Result<Backend> {
        match &self.database_url {
            Some(url) => Ok(Backend::Postgres(PgStore::connect(url).await?)),
            None => {
                let store = FileStore::new(&self.data_dir);
                info!(dir = %store.dir().display(), "using file store");
                Ok(Backend::File(store))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_is_reported() {
        let config = StoreConfig {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            database_url: None,
        };
        let err = config.require_database_url().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[tokio::test]
    async fn file_store_is_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            data_dir: dir.path().to_path_buf(),
            database_url: None,
        };
        match config.open().await.unwrap() {
            Backend::File(store) => assert_eq!(store.dir(), dir.path()),
            Backend::Postgres(_) => panic!("expected file store"),
        }
    }
}
