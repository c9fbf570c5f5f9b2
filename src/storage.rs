use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

/// Stores blobs as plain files under a base directory. Keys are
/// forward-slash relative paths computed by the upload flow.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }

    /// Round-trip write/read/delete under the base directory, run once at
    /// startup so permission and mount problems surface before the first
    /// upload does.
    pub async fn validate(&self) -> Result<()> {
        let key = ".health-check/probe.bin";
        let payload = b"storage-health-check".to_vec();
        self.put_object(key, payload.clone()).await?;
        let read_back = self.get_object(key).await?;
        if read_back != payload {
            anyhow::bail!("storage read-back mismatch at {key}");
        }
        self.delete_object(key).await?;
        let _ = fs::remove_dir(self.base_path.join(".health-check")).await;
        Ok(())
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.full_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create storage directory {}", parent.display()))?;
        }
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write object {}", path.display()))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.full_path(key);
        fs::read(&path)
            .await
            .with_context(|| format!("failed to read object {}", path.display()))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.full_path(key);
        fs::remove_file(&path)
            .await
            .with_context(|| format!("failed to delete object {}", path.display()))?;
        Ok(())
    }
}
