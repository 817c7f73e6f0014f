//! Lightweight test harness for in-process filesystem tests
//!
//! Wires an in-memory metadata store and an in-memory blob store into
//! mounted filesystems for one or more users, without requiring privileges
//! or a kernel mount.
//!
//! # Example
//!
//! ```rust,ignore
//! use netsecfs_fs::testkit::TestEnv;
//!
//! #[tokio::test]
//! async fn test_create_and_read() -> anyhow::Result<()> {
//!     let env = TestEnv::new().await?;
//!     let alice = env.add_user("alice").await?;
//!
//!     let (_, _, fh) = alice.fs.do_create(1, "hello", 0o644).await.unwrap();
//!     alice.fs.do_write(fh, 0, b"HELLO").await.unwrap();
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use tokio::runtime::Handle;

use common::crypto::{PrivateKey, Secret};
use netsecfs_object_store::{BlobStore, ObjectStoreConfig};

use crate::fuse::NetSecFs;
use crate::meta::{op_context, Format, MetaStore, OpContext};

/// Small modulus keeps key generation fast in debug builds; production key
/// pairs come from the host.
const TEST_KEY_BITS: usize = 1024;

/// A shared backing environment: one metadata database, one blob store.
pub struct TestEnv {
    pub meta: MetaStore,
    pub objects: BlobStore,
    pub format: Format,
}

/// One user's mounted filesystem plus the key material behind it.
pub struct TestMount {
    pub fs: NetSecFs,
    pub user_id: u32,
    pub private_key: PrivateKey,
    pub master_key: Vec<u8>,
}

impl TestEnv {
    /// Create a formatted in-memory environment.
    pub async fn new() -> Result<Self> {
        let meta = MetaStore::in_memory().await?;
        let format = meta.init(Format::new("fs1")).await?;
        let objects = BlobStore::new(ObjectStoreConfig::Memory).await?;
        Ok(Self {
            meta,
            objects,
            format,
        })
    }

    /// A fresh never-cancelled request context.
    pub fn context(&self) -> OpContext {
        let (handle, ctx) = op_context();
        // The receiver keeps the last observed value once the sender drops,
        // so the context stays un-cancelled.
        drop(handle);
        ctx
    }

    /// Register `username` and mount a filesystem for them with freshly
    /// generated key material.
    pub async fn add_user(&self, username: &str) -> Result<TestMount> {
        let ctx = self.context();
        let user_id = self
            .meta
            .create_user(&ctx, username, "password-hash")
            .await?;

        let private_key = PrivateKey::generate(TEST_KEY_BITS)?;
        let master_key = Secret::generate().bytes().to_vec();

        let fs = NetSecFs::new(
            Handle::current(),
            self.meta.clone(),
            self.objects.clone(),
            private_key.clone(),
            master_key.clone(),
            username,
        )
        .await?;

        Ok(TestMount {
            fs,
            user_id,
            private_key,
            master_key,
        })
    }
}
