//! Integration tests for the node and file-handle layers, driven through
//! the same operation surface the FUSE glue uses.

use netsecfs_fs::meta::{NodeKind, SetAttrRequest, ROOT_INODE};
use netsecfs_fs::testkit::TestEnv;

const ROOT: u64 = ROOT_INODE.0;

fn names(entries: &[netsecfs_fs::fuse::DirEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.name.as_str()).collect()
}

#[tokio::test]
async fn test_lookup_before_readdir_misses() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    alice.fs.do_mkdir(ROOT, "d", 0o755).await.unwrap();

    // Bob's mount has not listed the root yet; the name cache is the only
    // resolver, so lookup misses before any visibility check can run.
    let bob = env.add_user("bob").await?;
    assert_eq!(bob.fs.do_lookup(ROOT, "d").await, Err(libc::ENOENT));

    // The creating mount cached the entry at create time
    assert!(alice.fs.do_lookup(ROOT, "d").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_fresh_mount_mkdir_and_readdir() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    let (_, dir_attr) = alice.fs.do_mkdir(ROOT, "d", 0o755).await.unwrap();
    assert_eq!(dir_attr.kind, NodeKind::Directory);
    assert_eq!(dir_attr.mode, 0o755);
    assert_eq!(dir_attr.nlink, 2);

    let entries = alice.fs.do_readdir(ROOT).await.unwrap();
    assert_eq!(names(&entries), [".", "..", "d"]);

    let root_attr = alice.fs.do_getattr(ROOT).await.unwrap();
    assert_eq!(root_attr.nlink, 3);

    // Every listed name resolves afterwards
    for entry in entries.iter().filter(|e| !e.name.starts_with('.')) {
        let (ino, _) = alice.fs.do_lookup(ROOT, &entry.name).await.unwrap();
        assert_eq!(ino.0, entry.ino);
    }
    Ok(())
}

#[tokio::test]
async fn test_create_write_read_back() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    let (ino, attr, fh) = alice.fs.do_create(ROOT, "hello", 0o644).await.unwrap();
    assert_eq!(attr.kind, NodeKind::File);
    assert_eq!(attr.length, 0);

    let written = alice.fs.do_write(fh, 0, b"HELLO").await.unwrap();
    assert_eq!(written, 5);

    assert_eq!(alice.fs.do_read(fh, 0, 5).await.unwrap(), b"HELLO");
    assert_eq!(alice.fs.do_read(fh, 2, 2).await.unwrap(), b"LL");
    // Short reads past the end are permitted
    assert_eq!(alice.fs.do_read(fh, 3, 100).await.unwrap(), b"LO");
    assert!(alice.fs.do_read(fh, 100, 5).await.unwrap().is_empty());

    assert_eq!(alice.fs.do_getattr(ino.0).await.unwrap().length, 5);
    Ok(())
}

#[tokio::test]
async fn test_names_and_payloads_are_encrypted_at_rest() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    let (ino, _, fh) = alice.fs.do_create(ROOT, "hello", 0o644).await.unwrap();
    alice.fs.do_write(fh, 0, b"HELLO").await.unwrap();

    // The edge row carries ciphertext, not the name
    let entries = env
        .meta
        .readdir(&env.context(), ROOT_INODE, alice.user_id)
        .await?;
    assert_eq!(entries.len(), 1);
    assert_ne!(entries[0].name, b"hello");
    assert!(entries[0].name.len() >= 12 + 5 + 16);
    assert!(!entries[0].key.is_empty());

    // The blob is sealed too
    let blob = env.objects.get(ino.0, None, 0).await?;
    assert_ne!(blob.as_ref(), b"HELLO");
    assert!(blob.len() >= 12 + 5 + 16);
    Ok(())
}

#[tokio::test]
async fn test_whole_object_rewrite_per_write() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    let (ino, _, fh) = alice.fs.do_create(ROOT, "f", 0o644).await.unwrap();
    alice.fs.do_write(fh, 0, b"0123456789").await.unwrap();
    // Each write replaces the whole object; partial updates are
    // read-modify-write for the caller.
    alice.fs.do_write(fh, 0, b"AB").await.unwrap();

    assert_eq!(alice.fs.do_read(fh, 0, 100).await.unwrap(), b"AB");
    // Metadata length never shrinks on write
    assert_eq!(alice.fs.do_getattr(ino.0).await.unwrap().length, 10);
    Ok(())
}

#[tokio::test]
async fn test_long_names_are_rejected_everywhere() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;
    let long = "x".repeat(256);

    assert_eq!(
        alice.fs.do_create(ROOT, &long, 0o644).await,
        Err(libc::ENAMETOOLONG)
    );
    assert_eq!(
        alice.fs.do_mkdir(ROOT, &long, 0o755).await.map(|_| ()),
        Err(libc::ENAMETOOLONG)
    );
    assert_eq!(
        alice.fs.do_lookup(ROOT, &long).await.map(|_| ()),
        Err(libc::ENAMETOOLONG)
    );
    assert_eq!(alice.fs.do_unlink(ROOT, &long).await, Err(libc::ENAMETOOLONG));
    assert_eq!(alice.fs.do_rmdir(ROOT, &long).await, Err(libc::ENAMETOOLONG));

    // Nothing was inserted
    assert_eq!(names(&alice.fs.do_readdir(ROOT).await.unwrap()), [".", ".."]);

    // 255 bytes is still fine
    let ok = "y".repeat(255);
    assert!(alice.fs.do_create(ROOT, &ok, 0o644).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_names_are_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    alice.fs.do_mkdir(ROOT, "d", 0o755).await.unwrap();
    assert_eq!(
        alice.fs.do_mkdir(ROOT, "d", 0o755).await.map(|_| ()),
        Err(libc::EEXIST)
    );
    assert_eq!(
        alice.fs.do_create(ROOT, "d", 0o644).await.map(|_| ()),
        Err(libc::EEXIST)
    );

    let entries = alice.fs.do_readdir(ROOT).await.unwrap();
    assert_eq!(names(&entries), [".", "..", "d"]);
    Ok(())
}

#[tokio::test]
async fn test_unlink_removes_entry_and_blob() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    let (ino, _, fh) = alice.fs.do_create(ROOT, "f", 0o644).await.unwrap();
    alice.fs.do_write(fh, 0, b"data").await.unwrap();

    alice.fs.do_unlink(ROOT, "f").await.unwrap();
    assert_eq!(alice.fs.do_lookup(ROOT, "f").await.map(|_| ()), Err(libc::ENOENT));
    assert!(env.objects.get(ino.0, None, 0).await.is_err());

    // Unlinking a file the cache no longer knows is ENOENT
    assert_eq!(alice.fs.do_unlink(ROOT, "f").await, Err(libc::ENOENT));
    Ok(())
}

#[tokio::test]
async fn test_rmdir_reserved_names() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    assert_eq!(alice.fs.do_rmdir(ROOT, "shared").await, Err(libc::EPERM));
    assert_eq!(alice.fs.do_rmdir(ROOT, ".").await, Err(libc::EINVAL));
    assert_eq!(alice.fs.do_rmdir(ROOT, "..").await, Err(libc::ENOTEMPTY));
    Ok(())
}

#[tokio::test]
async fn test_rmdir_lifecycle() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    let (dir_ino, _) = alice.fs.do_mkdir(ROOT, "d", 0o755).await.unwrap();
    alice.fs.do_create(dir_ino.0, "f", 0o644).await.unwrap();

    assert_eq!(alice.fs.do_rmdir(ROOT, "d").await, Err(libc::ENOTEMPTY));

    alice.fs.do_unlink(dir_ino.0, "f").await.unwrap();
    alice.fs.do_rmdir(ROOT, "d").await.unwrap();

    assert_eq!(alice.fs.do_lookup(ROOT, "d").await.map(|_| ()), Err(libc::ENOENT));
    assert_eq!(names(&alice.fs.do_readdir(ROOT).await.unwrap()), [".", ".."]);
    Ok(())
}

#[tokio::test]
async fn test_truncate_through_setattr() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    let (ino, _, fh) = alice.fs.do_create(ROOT, "f", 0o644).await.unwrap();
    alice.fs.do_write(fh, 0, b"0123456789").await.unwrap();

    // Shrink discards trailing bytes
    let attr = alice
        .fs
        .do_setattr(
            ino.0,
            SetAttrRequest {
                length: Some(4),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(attr.length, 4);
    assert_eq!(alice.fs.do_read(fh, 0, 100).await.unwrap(), b"0123");

    // Extend zero-fills
    alice
        .fs
        .do_setattr(
            ino.0,
            SetAttrRequest {
                length: Some(6),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(alice.fs.do_read(fh, 0, 100).await.unwrap(), b"0123\0\0");
    Ok(())
}

#[tokio::test]
async fn test_setattr_mode_and_times() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    let (ino, _, _) = alice.fs.do_create(ROOT, "f", 0o644).await.unwrap();
    let attr = alice
        .fs
        .do_setattr(
            ino.0,
            SetAttrRequest {
                mode: Some(0o400),
                atime: Some((111, 0)),
                mtime: Some((222, 0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(attr.mode, 0o400);
    assert_eq!(attr.atime, 111);
    assert_eq!(attr.mtime, 222);
    Ok(())
}

#[tokio::test]
async fn test_open_and_release() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;

    let (ino, _, first) = alice.fs.do_create(ROOT, "f", 0o644).await.unwrap();
    alice.fs.do_write(first, 0, b"abc").await.unwrap();

    let fh = alice.fs.do_open(ino.0, 0).await.unwrap();
    assert_ne!(fh, first);
    assert_eq!(alice.fs.do_read(fh, 0, 3).await.unwrap(), b"abc");

    alice.fs.do_release(fh);
    assert_eq!(alice.fs.do_read(fh, 0, 3).await, Err(libc::EIO));

    // Opening an inode the mount has never resolved fails
    assert_eq!(alice.fs.do_open(4242, 0).await, Err(libc::ENOENT));
    Ok(())
}

#[tokio::test]
async fn test_create_in_shared_directory_is_refused() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let alice = env.add_user("alice").await?;
    env.meta.ensure_shared(&env.context()).await?;

    // Reach the shared directory the way the kernel would
    alice.fs.do_readdir(ROOT).await.unwrap();
    let (shared_ino, _) = alice.fs.do_lookup(ROOT, "shared").await.unwrap();

    assert_eq!(
        alice
            .fs
            .do_create(shared_ino.0, "f", 0o644)
            .await
            .map(|_| ()),
        Err(libc::EACCES)
    );
    Ok(())
}
