//! The node layer: one in-memory node per reachable inode, routing FUSE
//! upcalls to the metadata and object stores and performing encryption and
//! decryption at the boundary.

mod file;
mod fs;
mod node;

pub use fs::{DirEntry, NetSecFs};

/// Standard filesystem error number, as replied to the kernel.
pub(crate) type Errno = libc::c_int;

/// Maximum encoded name length, checked before encryption.
pub(crate) const MAX_NAME: usize = 255;
/// Block size reported to the kernel.
pub(crate) const BLOCK_SIZE: u64 = 1 << 12;
/// Capacity reported by statfs: 1 TiB.
pub(crate) const MAX_FS_SIZE: u64 = 1 << 40;
