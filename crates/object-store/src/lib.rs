//! Opaque blob storage for file payloads
//!
//! This crate holds the object-store side of the filesystem: one blob per
//! inode, addressed by inode number plus an optional secondary key, with
//! pluggable backends (in-memory, local filesystem, S3-compatible).
//!
//! The store is binary-transparent. Payloads arrive already encrypted and
//! leave still encrypted; the node layer above owns the keys. Writers for a
//! given inode are serialized by the caller, the store itself provides no
//! ordering between them.
//!
//! # Example
//!
//! ```rust,no_run
//! use netsecfs_object_store::{BlobStore, ObjectStoreConfig};
//!
//! # async fn example() -> Result<(), netsecfs_object_store::ObjectStoreError> {
//! let store = BlobStore::new(ObjectStoreConfig::Memory).await?;
//! store.put(42, None, b"sealed bytes".as_ref().into()).await?;
//! let data = store.get(42, None, 0).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod store;

pub use error::{ObjectStoreError, Result};
pub use store::{BlobStore, ObjectStoreConfig};
