//! File handles: read/write against the object store through a node's key.

use std::sync::Arc;

use common::crypto::envelope;
use netsecfs_object_store::{BlobStore, ObjectStoreError};

use crate::meta::{MetaStore, OpContext};

use super::node::Node;
use super::Errno;

/// An open handle bound to a node.
///
/// Holds no position or buffer; the kernel supplies offsets and the whole
/// object is rewritten per write, so the handle only needs the node (and
/// with it the key and the per-inode write lock).
#[derive(Clone)]
pub(crate) struct FileHandle {
    pub node: Arc<Node>,
}

impl FileHandle {
    /// Serve a byte range of the file.
    ///
    /// The blob is fetched whole and opened with the node's key before the
    /// range is cut; short reads past the end are permitted. A file that
    /// was created but never written reads as empty.
    pub async fn read(
        &self,
        objects: &BlobStore,
        offset: u64,
        size: u32,
    ) -> Result<Vec<u8>, Errno> {
        let key = self.node.file_key()?;
        let blob = match objects.get(self.node.ino.0, None, 0).await {
            Ok(blob) => blob,
            Err(ObjectStoreError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => {
                tracing::error!(ino = %self.node.ino, error = %e, "object store read failed");
                return Err(libc::EIO);
            }
        };
        let plain = envelope::decrypt(key, &blob).map_err(|e| {
            tracing::error!(ino = %self.node.ino, error = %e, "stored payload failed to decrypt");
            libc::EINVAL
        })?;

        let start = (offset as usize).min(plain.len());
        let end = (offset as usize).saturating_add(size as usize).min(plain.len());
        Ok(plain[start..end].to_vec())
    }

    /// Persist a write: metadata first (length and mtime), then the sealed
    /// payload, under the node's write lock.
    ///
    /// The whole object is rewritten from `data`; callers needing partial
    /// updates read-modify-write. A failure between the two stores leaves an
    /// observable inconsistency, which is logged and surfaced as `EIO` so
    /// the kernel retries.
    pub async fn write(
        &self,
        meta: &MetaStore,
        objects: &BlobStore,
        ctx: &OpContext,
        data: &[u8],
        offset: u64,
    ) -> Result<u32, Errno> {
        let ino = self.node.ino;
        let _io = self.node.io.lock().await;

        meta.write(ctx, ino, data.len(), offset)
            .await
            .map_err(|e| e.errno())?;

        let key = self.node.file_key()?;
        let sealed = envelope::encrypt(key, data).map_err(|e| {
            tracing::error!(ino = %ino, error = %e, "failed to seal payload");
            libc::EINVAL
        })?;
        if let Err(e) = objects.put(ino.0, None, sealed.into()).await {
            tracing::warn!(
                ino = %ino,
                error = %e,
                "object store write failed after metadata update; length is ahead of content"
            );
            return Err(libc::EIO);
        }

        Ok(data.len() as u32)
    }
}
