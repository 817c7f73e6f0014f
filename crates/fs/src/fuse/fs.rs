//! FUSE filesystem implementation over the metadata and object stores.
//!
//! Implements the fuser::Filesystem trait. Each upcall is a thin wrapper
//! around an async `do_*` operation bridged with the runtime handle; the
//! `do_*` surface is also what the integration tests drive directly.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use tokio::runtime::Handle;

use common::crypto::{envelope, PrivateKey, PublicKey, Secret};
use netsecfs_object_store::{BlobStore, ObjectStoreError};

use crate::meta::{
    op_context, Attr, CancelHandle, Ino, MetaError, MetaStore, NodeKind, OpContext,
    SetAttrRequest, ROOT_INODE, SHARED_INODE,
};

use super::file::FileHandle;
use super::node::{DirKey, Node};
use super::{Errno, BLOCK_SIZE, MAX_FS_SIZE, MAX_NAME};

/// One decrypted directory entry, ready for the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub kind: NodeKind,
    pub name: String,
}

/// The mounted filesystem for one user.
///
/// Holds the user's id, master key (on the root node), and RSA private key,
/// plus the table of live in-memory nodes and open file handles.
pub struct NetSecFs {
    /// Tokio runtime handle for bridging the async stores
    rt: Handle,
    meta: MetaStore,
    objects: BlobStore,
    user_id: u32,
    /// Shared immutably across every node in the mount
    private_key: Arc<PrivateKey>,
    /// Live nodes: inode → node
    nodes: RwLock<HashMap<u64, Arc<Node>>>,
    /// Open handles: fh → handle
    handles: RwLock<HashMap<u64, FileHandle>>,
    /// Monotonically increasing file-handle counter
    next_fh: AtomicU64,
    /// Cancels in-flight metadata retries on unmount
    cancel: CancelHandle,
    ctx: OpContext,
}

impl NetSecFs {
    /// TTL for FUSE attributes and entries
    const ATTR_TTL: Duration = Duration::from_secs(1);

    /// Build the mount root for `username`.
    ///
    /// The root node holds the user's decrypted master key; every private
    /// child key chains from it during tree walks.
    pub async fn new(
        rt: Handle,
        meta: MetaStore,
        objects: BlobStore,
        private_key: PrivateKey,
        master_key: Vec<u8>,
        username: &str,
    ) -> Result<Self, MetaError> {
        let (cancel, ctx) = op_context();
        let user_id = meta.get_user_id(&ctx, username).await?;

        let fs = Self {
            rt,
            meta,
            objects,
            user_id,
            private_key: Arc::new(private_key),
            nodes: RwLock::new(HashMap::new()),
            handles: RwLock::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
            cancel,
            ctx,
        };
        fs.install_node(ROOT_INODE, master_key);
        Ok(fs)
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    /// The mount's request context; flips to cancelled on unmount.
    pub fn context(&self) -> OpContext {
        self.ctx.clone()
    }

    fn node(&self, ino: u64) -> Option<Arc<Node>> {
        self.nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&ino)
            .cloned()
    }

    /// Insert a node for `ino` carrying its decrypted key, or return the
    /// existing one (keeping its name cache) if the kernel already knows
    /// this inode.
    fn install_node(&self, ino: Ino, key: Vec<u8>) -> Arc<Node> {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        nodes
            .entry(ino.0)
            .or_insert_with(|| {
                let dir_key = if ino == SHARED_INODE {
                    DirKey::Rsa(self.private_key.clone())
                } else {
                    DirKey::Symmetric(key)
                };
                Arc::new(Node::new(ino, dir_key))
            })
            .clone()
    }

    fn register_handle(&self, node: Arc<Node>) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.handles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(fh, FileHandle { node });
        fh
    }

    fn handle(&self, fh: u64) -> Option<FileHandle> {
        self.handles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&fh)
            .cloned()
    }

    /// Resolve `name` under `parent`, decrypt the child's key, and install
    /// the child node.
    ///
    /// The name cache is authoritative here: a miss is `ENOENT`, repaired by
    /// the kernel re-reading the directory.
    pub async fn do_lookup(&self, parent: u64, name: &str) -> Result<(Ino, Attr), Errno> {
        if name.len() > MAX_NAME {
            return Err(libc::ENAMETOOLONG);
        }
        let parent_node = self.node(parent).ok_or(libc::ENOENT)?;
        let ino = parent_node.cached(name).ok_or(libc::ENOENT)?;

        let wrapped = match &parent_node.key {
            DirKey::Rsa(_) => self.meta.get_shared_key(&self.ctx, self.user_id, ino).await,
            DirKey::Symmetric(_) => self.meta.get_key(&self.ctx, ino).await,
        }
        .map_err(|e| e.errno())?;
        let child_key = parent_node.key.unwrap_key(&wrapped)?;

        let attr = self
            .meta
            .lookup(&self.ctx, self.user_id, Ino(parent), ino)
            .await
            .map_err(|e| e.errno())?;

        self.install_node(ino, child_key);
        Ok((ino, attr))
    }

    pub async fn do_getattr(&self, ino: u64) -> Result<Attr, Errno> {
        self.meta
            .get_attr(&self.ctx, Ino(ino))
            .await
            .map_err(|e| e.errno())
    }

    /// Apply attribute changes. A length change truncates: the blob is
    /// re-put zero-extended or cut, after the metadata store has validated
    /// and recorded the new length.
    pub async fn do_setattr(&self, ino: u64, req: SetAttrRequest) -> Result<Attr, Errno> {
        let attr = self
            .meta
            .set_attr(&self.ctx, Ino(ino), &req)
            .await
            .map_err(|e| e.errno())?;

        if let Some(new_len) = req.length {
            let node = self.node(ino).ok_or(libc::EIO)?;
            let key = node.file_key()?;
            let _io = node.io.lock().await;

            let blob = match self.objects.get(ino, None, 0).await {
                Ok(blob) => blob,
                Err(ObjectStoreError::NotFound(_)) => bytes::Bytes::new(),
                Err(e) => {
                    tracing::error!(ino, error = %e, "object store read failed during truncate");
                    return Err(libc::EIO);
                }
            };
            let mut plain = envelope::decrypt(key, &blob).map_err(|_| libc::EINVAL)?;
            plain.resize(new_len as usize, 0);
            let sealed = envelope::encrypt(key, &plain).map_err(|_| libc::EINVAL)?;
            if let Err(e) = self.objects.put(ino, None, sealed.into()).await {
                tracing::warn!(
                    ino,
                    error = %e,
                    "object store write failed after truncate; length is ahead of content"
                );
                return Err(libc::EIO);
            }
        }

        Ok(attr)
    }

    /// Create a file under `parent`: fresh inode, fresh key, name sealed
    /// under the child key, child key wrapped under the parent key.
    pub async fn do_create(
        &self,
        parent: u64,
        name: &str,
        mode: u32,
    ) -> Result<(Ino, Attr, u64), Errno> {
        let (ino, attr, node) = self
            .mknod_common(parent, name, mode, NodeKind::File)
            .await?;
        let fh = self.register_handle(node);
        Ok((ino, attr, fh))
    }

    /// Create a directory under `parent`. The new node starts with its own
    /// empty name cache.
    pub async fn do_mkdir(&self, parent: u64, name: &str, mode: u32) -> Result<(Ino, Attr), Errno> {
        let (ino, attr, _node) = self
            .mknod_common(parent, name, mode, NodeKind::Directory)
            .await?;
        Ok((ino, attr))
    }

    async fn mknod_common(
        &self,
        parent: u64,
        name: &str,
        mode: u32,
        kind: NodeKind,
    ) -> Result<(Ino, Attr, Arc<Node>), Errno> {
        if name.len() > MAX_NAME {
            return Err(libc::ENAMETOOLONG);
        }
        let parent_node = self.node(parent).ok_or(libc::ENOENT)?;
        if parent_node.cached(name).is_some() {
            return Err(libc::EEXIST);
        }
        let parent_key = match &parent_node.key {
            DirKey::Symmetric(key) => key.clone(),
            // Entries appear under the shared directory through the share
            // flow, never by direct creation.
            DirKey::Rsa(_) => return Err(libc::EACCES),
        };

        let ino = self
            .meta
            .next_inode(&self.ctx)
            .await
            .map_err(|e| e.errno())?;
        let secret = Secret::generate();
        let encrypted_name =
            envelope::encrypt(secret.bytes(), name.as_bytes()).map_err(|_| libc::EINVAL)?;
        let wrapped_key =
            envelope::encrypt(&parent_key, secret.bytes()).map_err(|_| libc::EINVAL)?;

        let attr = self
            .meta
            .mknod(
                &self.ctx,
                Ino(parent),
                kind,
                (mode & 0o7777) as u16,
                self.user_id,
                ino,
                &encrypted_name,
                &wrapped_key,
            )
            .await
            .map_err(|e| e.errno())?;

        parent_node.remember(name, ino);
        let node = self.install_node(ino, secret.bytes().to_vec());
        Ok((ino, attr, node))
    }

    /// List a directory, decrypting each entry and repopulating the name
    /// cache. Synthetic `.` and `..` lead the stream.
    pub async fn do_readdir(&self, ino: u64) -> Result<Vec<DirEntry>, Errno> {
        let node = self.node(ino).ok_or(libc::ENOENT)?;
        let attr = self
            .meta
            .get_attr(&self.ctx, Ino(ino))
            .await
            .map_err(|e| e.errno())?;
        let parent_ino = if Ino(ino) == ROOT_INODE {
            ROOT_INODE
        } else {
            attr.parent
        };

        let mut result = vec![
            DirEntry {
                ino,
                kind: NodeKind::Directory,
                name: ".".to_string(),
            },
            DirEntry {
                ino: parent_ino.0,
                kind: NodeKind::Directory,
                name: "..".to_string(),
            },
        ];

        let entries = self
            .meta
            .readdir(&self.ctx, Ino(ino), self.user_id)
            .await
            .map_err(|e| e.errno())?;
        for entry in entries {
            let child_key = node.key.unwrap_key(&entry.key)?;
            let name_bytes =
                envelope::decrypt(&child_key, &entry.name).map_err(|_| libc::EINVAL)?;
            let name = String::from_utf8(name_bytes).map_err(|_| libc::EINVAL)?;
            if name != "." && name != ".." {
                node.remember(&name, entry.ino);
            }
            result.push(DirEntry {
                ino: entry.ino.0,
                kind: entry.kind,
                name,
            });
        }
        Ok(result)
    }

    /// Remove a file: the edge goes from metadata, the name from the cache,
    /// and the blob from the object store.
    pub async fn do_unlink(&self, parent: u64, name: &str) -> Result<(), Errno> {
        if name.len() > MAX_NAME {
            return Err(libc::ENAMETOOLONG);
        }
        let parent_node = self.node(parent).ok_or(libc::ENOENT)?;
        let ino = parent_node.cached(name).ok_or(libc::ENOENT)?;

        self.meta
            .unlink(&self.ctx, Ino(parent), ino)
            .await
            .map_err(|e| e.errno())?;
        parent_node.forget_name(name);

        self.objects.delete(ino.0, None).await.map_err(|e| {
            tracing::warn!(ino = %ino, error = %e, "blob delete failed after unlink");
            libc::EIO
        })?;
        Ok(())
    }

    /// Remove an empty directory. The reserved `shared` entry refuses with
    /// `EPERM`, `.` with `EINVAL`, `..` with `ENOTEMPTY`.
    pub async fn do_rmdir(&self, parent: u64, name: &str) -> Result<(), Errno> {
        if name.len() > MAX_NAME {
            return Err(libc::ENAMETOOLONG);
        }
        if name == "shared" {
            return Err(libc::EPERM);
        }
        if name == "." {
            return Err(libc::EINVAL);
        }
        if name == ".." {
            return Err(libc::ENOTEMPTY);
        }
        let parent_node = self.node(parent).ok_or(libc::ENOENT)?;
        let ino = parent_node.cached(name).ok_or(libc::ENOENT)?;

        self.meta
            .rmdir(&self.ctx, Ino(parent), ino)
            .await
            .map_err(|e| e.errno())?;
        parent_node.forget_name(name);
        Ok(())
    }

    /// Open a handle on an existing node. No state is kept for the kernel
    /// beyond the handle-to-node binding.
    pub async fn do_open(&self, ino: u64, _flags: i32) -> Result<u64, Errno> {
        let node = self.node(ino).ok_or(libc::ENOENT)?;
        Ok(self.register_handle(node))
    }

    pub async fn do_read(&self, fh: u64, offset: u64, size: u32) -> Result<Vec<u8>, Errno> {
        let handle = self.handle(fh).ok_or(libc::EIO)?;
        handle.read(&self.objects, offset, size).await
    }

    pub async fn do_write(&self, fh: u64, offset: u64, data: &[u8]) -> Result<u32, Errno> {
        let handle = self.handle(fh).ok_or(libc::EIO)?;
        handle
            .write(&self.meta, &self.objects, &self.ctx, data, offset)
            .await
    }

    pub fn do_release(&self, fh: u64) {
        self.handles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&fh);
    }

    /// Wire an existing entry into the shared directory for `recipient`,
    /// wrapping its key under the recipient's public key. The external
    /// share flow drives this.
    pub async fn do_share(
        &self,
        parent: u64,
        name: &str,
        recipient: u32,
        recipient_key: &PublicKey,
    ) -> Result<(), Errno> {
        if name.len() > MAX_NAME {
            return Err(libc::ENAMETOOLONG);
        }
        let parent_node = self.node(parent).ok_or(libc::ENOENT)?;
        let ino = parent_node.cached(name).ok_or(libc::ENOENT)?;
        if matches!(&parent_node.key, DirKey::Rsa(_)) {
            // Entries already under the shared directory cannot be re-shared.
            return Err(libc::EPERM);
        }

        let wrapped = self
            .meta
            .get_key(&self.ctx, ino)
            .await
            .map_err(|e| e.errno())?;
        let file_key = parent_node.key.unwrap_key(&wrapped)?;

        let encrypted_name =
            envelope::encrypt(&file_key, name.as_bytes()).map_err(|_| libc::EINVAL)?;
        let shared_key = recipient_key.encrypt(&file_key).map_err(|_| libc::EINVAL)?;

        self.meta
            .share(
                &self.ctx,
                ino,
                self.user_id,
                recipient,
                &encrypted_name,
                &shared_key,
            )
            .await
            .map_err(|e| e.errno())
    }
}

/// Build the kernel-facing attributes. Non-root inodes report the invoking
/// process's ids so the user owns everything visible inside their mount.
fn to_file_attr(ino: u64, attr: &Attr) -> FileAttr {
    let kind = match attr.kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::File => FileType::RegularFile,
    };
    let (uid, gid) = if ino == ROOT_INODE.0 {
        (0, 0)
    } else {
        (unsafe { libc::getuid() }, unsafe { libc::getgid() })
    };

    FileAttr {
        ino,
        size: attr.length,
        blocks: attr.length.div_ceil(512),
        atime: to_system_time(attr.atime, attr.atimensec),
        mtime: to_system_time(attr.mtime, attr.mtimensec),
        ctime: to_system_time(attr.ctime, attr.ctimensec),
        crtime: to_system_time(attr.ctime, attr.ctimensec),
        kind,
        perm: attr.mode,
        nlink: attr.nlink,
        uid,
        gid,
        rdev: attr.rdev,
        blksize: BLOCK_SIZE as u32,
        flags: 0,
    }
}

fn to_system_time(secs: i64, nanos: u32) -> SystemTime {
    if secs < 0 {
        UNIX_EPOCH
    } else {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    }
}

fn time_parts(t: SystemTime) -> (i64, u32) {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(_) => (0, 0),
    }
}

fn time_or_now(t: TimeOrNow) -> (i64, u32) {
    match t {
        TimeOrNow::SpecificTime(t) => time_parts(t),
        TimeOrNow::Now => {
            let now = chrono::Utc::now();
            (now.timestamp(), now.timestamp_subsec_nanos())
        }
    }
}

impl Filesystem for NetSecFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        tracing::info!(user = self.user_id, "filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        self.cancel.cancel();
        tracing::info!(user = self.user_id, "filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.rt.block_on(self.do_lookup(parent, name)) {
            Ok((ino, attr)) => reply.entry(&Self::ATTR_TTL, &to_file_attr(ino.0, &attr), 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, _nlookup: u64) {
        if ino != ROOT_INODE.0 {
            self.nodes
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&ino);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.rt.block_on(self.do_getattr(ino)) {
            Ok(attr) => reply.attr(&Self::ATTR_TTL, &to_file_attr(ino, &attr)),
            Err(errno) => reply.error(errno),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let req = SetAttrRequest {
            mode: mode.map(|m| (m & 0o7777) as u16),
            uid,
            gid,
            length: size,
            atime: atime.map(time_or_now),
            mtime: mtime.map(time_or_now),
        };

        match self.rt.block_on(self.do_setattr(ino, req)) {
            Ok(attr) => reply.attr(&Self::ATTR_TTL, &to_file_attr(ino, &attr)),
            Err(errno) => reply.error(errno),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(
            MAX_FS_SIZE / BLOCK_SIZE,
            (MAX_FS_SIZE - 1_000_000_000) / BLOCK_SIZE,
            (MAX_FS_SIZE - 1_000_000_000) / BLOCK_SIZE,
            1_000_000_000,
            1_000_000_000,
            BLOCK_SIZE as u32,
            MAX_NAME as u32,
            BLOCK_SIZE as u32,
        );
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.rt.block_on(self.do_open(ino, flags)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self.rt.block_on(self.do_create(parent, name, mode)) {
            Ok((ino, attr, fh)) => reply.created(
                &Self::ATTR_TTL,
                &to_file_attr(ino.0, &attr),
                0,
                fh,
                flags as u32,
            ),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self.rt.block_on(self.do_mkdir(parent, name, mode)) {
            Ok((ino, attr)) => reply.entry(&Self::ATTR_TTL, &to_file_attr(ino.0, &attr), 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.rt.block_on(self.do_readdir(ino)) {
            Ok(entries) => entries,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        for (i, entry) in entries.into_iter().enumerate().skip(offset as usize) {
            let kind = match entry.kind {
                NodeKind::Directory => FileType::Directory,
                NodeKind::File => FileType::RegularFile,
            };
            if reply.add(entry.ino, (i + 1) as i64, kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self.rt.block_on(self.do_rmdir(parent, name)) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                reply.error(libc::EINVAL);
                return;
            }
        };

        match self.rt.block_on(self.do_unlink(parent, name)) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self
            .rt
            .block_on(self.do_read(fh, offset.max(0) as u64, size))
        {
            Ok(data) => reply.data(&data),
            Err(errno) => reply.error(errno),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self
            .rt
            .block_on(self.do_write(fh, offset.max(0) as u64, data))
        {
            Ok(written) => reply.written(written),
            Err(errno) => reply.error(errno),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // Durability is synchronous in write; nothing buffered to push out.
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.do_release(fh);
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        reply.ok();
    }
}
