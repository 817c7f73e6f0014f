//! Core metadata types: inode numbers, attributes, directory entries,
//! the filesystem format descriptor, and per-request context.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

/// Inode number: monotonically allocated, never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Ino(pub u64);

/// The root of the filesystem tree.
pub const ROOT_INODE: Ino = Ino(1);
/// The distinguished `shared` directory whose edges carry RSA-wrapped keys.
pub const SHARED_INODE: Ino = Ino(2);

/// Freshly allocated inode numbers start here, above the reserved range.
pub(crate) const FIRST_DYNAMIC_INODE: u64 = 1000;

impl fmt::Display for Ino {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Ino {
    fn from(v: u64) -> Self {
        Ino(v)
    }
}

impl Ino {
    pub(crate) fn as_i64(self) -> i64 {
        self.0 as i64
    }
}

/// Kind of a persistent node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File = 1,
    Directory = 2,
}

impl NodeKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            2 => NodeKind::Directory,
            _ => NodeKind::File,
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, NodeKind::Directory)
    }
}

/// Attributes of a node as stored in the metadata schema.
///
/// Timestamps are seconds since the epoch plus a nanosecond part; the
/// database stores microseconds plus a sub-microsecond remainder and the
/// store converts on the way out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub kind: NodeKind,
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub atimensec: u32,
    pub mtime: i64,
    pub mtimensec: u32,
    pub ctime: i64,
    pub ctimensec: u32,
    pub nlink: u32,
    pub length: u64,
    pub rdev: u32,
    pub parent: Ino,
}

impl Default for Attr {
    fn default() -> Self {
        Self {
            kind: NodeKind::File,
            mode: 0,
            uid: 0,
            gid: 0,
            atime: 0,
            atimensec: 0,
            mtime: 0,
            mtimensec: 0,
            ctime: 0,
            ctimensec: 0,
            nlink: 0,
            length: 0,
            rdev: 0,
            parent: ROOT_INODE,
        }
    }
}

/// One directory entry as returned by `readdir`: the child inode, its
/// encrypted name, the wrapped per-file key, and the child's attributes.
#[derive(Debug, Clone)]
pub struct Entry {
    pub ino: Ino,
    pub name: Vec<u8>,
    pub key: Vec<u8>,
    pub kind: NodeKind,
    pub attr: Attr,
}

/// Requested attribute changes; only fields that are `Some` are applied.
#[derive(Debug, Clone, Default)]
pub struct SetAttrRequest {
    pub mode: Option<u16>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub length: Option<u64>,
    /// seconds + nanoseconds
    pub atime: Option<(i64, u32)>,
    /// seconds + nanoseconds
    pub mtime: Option<(i64, u32)>,
}

impl SetAttrRequest {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
            && self.uid.is_none()
            && self.gid.is_none()
            && self.length.is_none()
            && self.atime.is_none()
            && self.mtime.is_none()
    }
}

/// Filesystem format descriptor, serialized as JSON into the settings table
/// at init time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub name: String,
    pub uuid: Uuid,
    #[serde(rename = "blocksize")]
    pub block_size: u32,
    pub capacity: u64,
}

impl Format {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
            block_size: 4096,
            capacity: 1 << 40,
        }
    }
}

/// Per-request context carrying the transport's cancellation signal.
///
/// Metadata retries observe the flag between attempts and abandon with
/// `EINTR` once it flips.
#[derive(Debug, Clone)]
pub struct OpContext {
    cancel: watch::Receiver<bool>,
}

impl OpContext {
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Owning side of a cancellation signal; kept by the mount.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Flip the flag; every in-flight context observes it at its next check.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn context(&self) -> OpContext {
        OpContext {
            cancel: self.tx.subscribe(),
        }
    }
}

/// Create a linked cancellation handle and context.
pub fn op_context() -> (CancelHandle, OpContext) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, OpContext { cancel: rx })
}

/// Current wall-clock time as (microseconds since epoch, nanosecond remainder).
pub(crate) fn now_micros() -> (i64, i64) {
    let now = chrono::Utc::now();
    (
        now.timestamp_micros(),
        (now.timestamp_subsec_nanos() % 1_000) as i64,
    )
}

/// Split stored microseconds + remainder into seconds + nanoseconds.
pub(crate) fn split_time(micros: i64, nsec: i64) -> (i64, u32) {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000 + nsec) as u32;
    (secs, nanos)
}
