/**
 * Encrypted network filesystem core.
 *  - `meta`: the transactional metadata store (users, nodes,
 *    edges, settings) over SQLite
 *  - `fuse`: the in-memory node layer and file handles that
 *    route FUSE upcalls to the metadata and object stores,
 *    encrypting and decrypting at the boundary
 *  - `testkit`: an in-process harness wiring in-memory stores
 *    together for integration tests
 */
pub mod fuse;
pub mod meta;
pub mod testkit;

pub mod prelude {
    pub use crate::fuse::NetSecFs;
    pub use crate::meta::{
        op_context, Attr, CancelHandle, Format, Ino, MetaError, MetaStore, NodeKind, OpContext,
        ROOT_INODE, SHARED_INODE,
    };
}
