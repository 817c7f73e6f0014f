//! Blob storage backend abstraction (S3/MinIO/local filesystem/memory).

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::error::{ObjectStoreError, Result};

/// Configuration for the blob storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

/// Blob store addressing whole objects by inode number.
///
/// One blob per `(ino, secondary)` address, rewritten whole on every put.
#[derive(Debug, Clone)]
pub struct BlobStore {
    inner: Arc<dyn ObjectStore>,
}

impl BlobStore {
    /// Create a new blob store from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let inner: Arc<dyn ObjectStore> = match &config {
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),

            ObjectStoreConfig::Local { path } => {
                // Ensure directory exists
                tokio::fs::create_dir_all(path).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| ObjectStoreError::InvalidConfig(e.to_string()))?,
                )
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"));

                Arc::new(
                    builder
                        .build()
                        .map_err(|e| ObjectStoreError::InvalidConfig(e.to_string()))?,
                )
            }
        };

        Ok(Self { inner })
    }

    /// Build the object path for an inode's blob.
    fn blob_path(ino: u64, secondary: Option<&str>) -> ObjectPath {
        match secondary {
            Some(sec) => ObjectPath::from(format!("blobs/{}/{}", ino, sec)),
            None => ObjectPath::from(format!("blobs/{}", ino)),
        }
    }

    /// Store a blob, replacing any previous content at this address.
    pub async fn put(&self, ino: u64, secondary: Option<&str>, data: Bytes) -> Result<()> {
        let path = Self::blob_path(ino, secondary);
        self.inner.put(&path, data.into()).await?;
        Ok(())
    }

    /// Fetch the blob at this address, starting at `offset`.
    ///
    /// Returns empty bytes when `offset` is at or past the end of the blob.
    ///
    /// # Errors
    ///
    /// [`ObjectStoreError::NotFound`] if nothing is stored at this address.
    pub async fn get(&self, ino: u64, secondary: Option<&str>, offset: u64) -> Result<Bytes> {
        let path = Self::blob_path(ino, secondary);
        match self.inner.get(&path).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                let start = (offset as usize).min(bytes.len());
                Ok(bytes.slice(start..))
            }
            Err(object_store::Error::NotFound { .. }) => {
                Err(ObjectStoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the blob at this address.
    ///
    /// Deleting an address that holds no blob is not an error, so unlinking
    /// a file that was never written still succeeds.
    pub async fn delete(&self, ino: u64, secondary: Option<&str>) -> Result<()> {
        let path = Self::blob_path(ino, secondary);
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> BlobStore {
        BlobStore::new(ObjectStoreConfig::Memory).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = memory_store().await;
        let data = Bytes::from("hello world");

        store.put(7, None, data.clone()).await.unwrap();
        let fetched = store.get(7, None, 0).await.unwrap();
        assert_eq!(fetched, data);

        store.delete(7, None).await.unwrap();
        assert!(matches!(
            store.get(7, None, 0).await,
            Err(ObjectStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_with_offset() {
        let store = memory_store().await;
        store.put(3, None, Bytes::from("0123456789")).await.unwrap();

        assert_eq!(store.get(3, None, 4).await.unwrap(), Bytes::from("456789"));
        assert!(store.get(3, None, 10).await.unwrap().is_empty());
        assert!(store.get(3, None, 1000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_replaces_whole_blob() {
        let store = memory_store().await;
        store.put(9, None, Bytes::from("a long first version")).await.unwrap();
        store.put(9, None, Bytes::from("short")).await.unwrap();

        assert_eq!(store.get(9, None, 0).await.unwrap(), Bytes::from("short"));
    }

    #[tokio::test]
    async fn test_secondary_key_addresses_separate_blob() {
        let store = memory_store().await;
        store.put(5, None, Bytes::from("primary")).await.unwrap();
        store.put(5, Some("aux"), Bytes::from("aux data")).await.unwrap();

        assert_eq!(store.get(5, None, 0).await.unwrap(), Bytes::from("primary"));
        assert_eq!(
            store.get(5, Some("aux"), 0).await.unwrap(),
            Bytes::from("aux data")
        );

        store.delete(5, Some("aux")).await.unwrap();
        assert!(store.get(5, None, 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = memory_store().await;
        store.delete(404, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_backend() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(ObjectStoreConfig::Local {
            path: temp_dir.path().to_path_buf(),
        })
        .await
        .unwrap();

        store.put(11, None, Bytes::from("on disk")).await.unwrap();
        assert_eq!(store.get(11, None, 0).await.unwrap(), Bytes::from("on disk"));

        // Verify the blob landed under the data directory
        let file_path = temp_dir.path().join("blobs").join("11");
        assert!(file_path.exists());
    }
}
