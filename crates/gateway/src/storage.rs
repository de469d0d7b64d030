use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};

/// Binary object storage collaborator. Content is keyed by opaque path, not
/// content hash; the registry rows in `db` map artifact ids to paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn write(&self, path: &str, bytes: &[u8], mime_type: &str) -> GatewayResult<()>;

    async fn read(&self, path: &str) -> GatewayResult<Vec<u8>>;

    /// A URL the presentation layer can fetch the object from.
    async fn signed_url(&self, path: &str) -> GatewayResult<String>;

    async fn delete(&self, path: &str) -> GatewayResult<()>;
}

/// Filesystem-backed store. Paths are sanitized to stay under the root.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> GatewayResult<PathBuf> {
        if path.is_empty() || path.contains("..") || path.starts_with('/') {
            return Err(GatewayError::InvalidPayload(format!(
                "invalid storage path: {path}"
            )));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn write(&self, path: &str, bytes: &[u8], mime_type: &str) -> GatewayResult<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        debug!(
            path = %full.display(),
            size = bytes.len(),
            mime_type,
            "Stored object"
        );
        Ok(())
    }

    async fn read(&self, path: &str) -> GatewayResult<Vec<u8>> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::read(&full).await?)
    }

    async fn signed_url(&self, path: &str) -> GatewayResult<String> {
        let full = self.resolve(path)?;
        if !tokio::fs::try_exists(&full).await? {
            return Err(GatewayError::Storage(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("object not found: {path}"),
            )));
        }
        Ok(format!("file://{}", full.display()))
    }

    async fn delete(&self, path: &str) -> GatewayResult<()> {
        let full = self.resolve(path)?;
        tokio::fs::remove_file(&full).await?;
        debug!(path = %full.display(), "Deleted object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store
            .write("pipelines/p1/step_1/a.png", b"bytes", "image/png")
            .await
            .unwrap();

        let url = store.signed_url("pipelines/p1/step_1/a.png").await.unwrap();
        assert!(url.starts_with("file://"));

        let bytes = store.read("pipelines/p1/step_1/a.png").await.unwrap();
        assert_eq!(bytes, b"bytes");

        store.delete("pipelines/p1/step_1/a.png").await.unwrap();
        assert!(store.signed_url("pipelines/p1/step_1/a.png").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_missing_object_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(store.delete("nope.png").await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(store.write("../escape.png", b"x", "image/png").await.is_err());
        assert!(store.write("/abs.png", b"x", "image/png").await.is_err());
    }
}
