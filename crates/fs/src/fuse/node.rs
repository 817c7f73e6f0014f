//! In-memory node state: the decrypted per-node key and the name cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use common::crypto::PrivateKey;

use crate::meta::Ino;

use super::Errno;

/// How a directory's children wrap their keys.
///
/// Private subtrees chain symmetrically from parent to child; the `shared`
/// directory wraps every child key under the viewing user's RSA public key.
/// The split is decided once, when the node is constructed, instead of
/// being re-derived from inode identity at every call site.
pub(crate) enum DirKey {
    /// The node's own decrypted 256-bit key. Empty is the root placeholder.
    Symmetric(Vec<u8>),
    /// Children are unwrapped with the mount's RSA private key.
    Rsa(Arc<PrivateKey>),
}

impl DirKey {
    /// Unwrap a child's wrapped key with whichever regime this node uses.
    ///
    /// Crypto failures surface as `EINVAL`, matching what the kernel gets
    /// for an undecryptable entry.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, Errno> {
        match self {
            DirKey::Symmetric(key) => common::crypto::envelope::decrypt(key, wrapped)
                .map_err(|e| {
                    tracing::debug!(error = %e, "failed to unwrap child key");
                    libc::EINVAL
                }),
            DirKey::Rsa(private_key) => private_key.decrypt(wrapped).map_err(|e| {
                tracing::debug!(error = %e, "failed to unwrap shared child key");
                libc::EINVAL
            }),
        }
    }
}

/// One in-memory node per reachable inode.
///
/// Born at `lookup`/`create`/`mkdir`, discarded when the kernel forgets the
/// inode. Owns its decrypted key for its whole lifetime; the key never
/// touches disk in plaintext and is never logged.
pub(crate) struct Node {
    pub ino: Ino,
    pub key: DirKey,
    /// Best-effort index from decrypted name to child inode. Populated by
    /// `readdir` (and `create`/`mkdir`), invalidated by `unlink`/`rmdir`;
    /// a stale miss costs at worst an `ENOENT` the kernel resolves by
    /// re-reading the directory.
    names: Mutex<HashMap<String, Ino>>,
    /// Serializes blob writes for this inode.
    pub io: tokio::sync::Mutex<()>,
}

impl Node {
    pub fn new(ino: Ino, key: DirKey) -> Self {
        Self {
            ino,
            key,
            names: Mutex::new(HashMap::new()),
            io: tokio::sync::Mutex::new(()),
        }
    }

    /// The node's own symmetric key; an error for the shared directory,
    /// which holds no content of its own.
    pub fn file_key(&self) -> Result<&[u8], Errno> {
        match &self.key {
            DirKey::Symmetric(key) => Ok(key),
            DirKey::Rsa(_) => Err(libc::EINVAL),
        }
    }

    pub fn cached(&self, name: &str) -> Option<Ino> {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
    }

    pub fn remember(&self, name: &str, ino: Ino) {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), ino);
    }

    pub fn forget_name(&self, name: &str) {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }
}
