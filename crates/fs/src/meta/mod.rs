//! Transactional metadata store over SQLite
//!
//! Ground truth for the filesystem: users, nodes, directed edges, and
//! settings, all under the `nsfs_` table prefix so the schema can share a
//! database with other tenants. Every mutation runs inside a short
//! transaction with bounded retry on driver contention; reads use the same
//! retry envelope without an explicit transaction.
//!
//! Edges carry the child's encrypted name and its wrapped key. For private
//! subtrees the key is sealed under the parent's symmetric key; for children
//! of the `shared` directory it is RSA-wrapped for the recipient user, whose
//! id is recorded on the edge.

mod error;
mod types;

use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};

pub use error::MetaError;
pub use types::{
    op_context, Attr, CancelHandle, Entry, Format, Ino, NodeKind, OpContext, SetAttrRequest,
    ROOT_INODE, SHARED_INODE,
};

use types::{now_micros, split_time, FIRST_DYNAMIC_INODE};

/// Maximum attempts for a contended transaction before giving up.
const TXN_MAX_RETRIES: u64 = 50;

/// Schema, created on demand by [`MetaStore::init`].
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS nsfs_setting (
        name TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS nsfs_user (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS nsfs_node (
        inode INTEGER PRIMARY KEY,
        type INTEGER NOT NULL,
        mode INTEGER NOT NULL,
        uid INTEGER NOT NULL,
        gid INTEGER NOT NULL,
        atime INTEGER NOT NULL,
        mtime INTEGER NOT NULL,
        ctime INTEGER NOT NULL,
        atimensec INTEGER NOT NULL DEFAULT 0,
        mtimensec INTEGER NOT NULL DEFAULT 0,
        ctimensec INTEGER NOT NULL DEFAULT 0,
        nlink INTEGER NOT NULL,
        length INTEGER NOT NULL,
        rdev INTEGER NOT NULL DEFAULT 0,
        parent INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS nsfs_edge (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        parent INTEGER NOT NULL,
        name BLOB NOT NULL,
        inode INTEGER NOT NULL,
        type INTEGER NOT NULL,
        key BLOB NOT NULL,
        recipient INTEGER,
        UNIQUE (parent, name),
        UNIQUE (parent, inode)
    )",
    "CREATE INDEX IF NOT EXISTS idx_nsfs_edge_inode ON nsfs_edge (inode)",
];

/// The metadata store: a SQLite pool plus the transaction discipline.
#[derive(Debug, Clone)]
pub struct MetaStore {
    pool: SqlitePool,
}

impl MetaStore {
    /// Open (or create) a metadata database at `path`.
    pub async fn connect(path: &Path) -> Result<Self, MetaError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MetaError::Database(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Open an in-memory metadata database.
    pub async fn in_memory() -> Result<Self, MetaError> {
        let options = SqliteConnectOptions::new().filename(":memory:");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Run a mutating closure inside a transaction, retrying transient
    /// driver failures with quadratic back-off and observing the request's
    /// cancellation flag between attempts.
    async fn txn<T, F>(&self, ctx: &OpContext, op: &'static str, f: F) -> Result<T, MetaError>
    where
        F: for<'c> Fn(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, MetaError>>,
    {
        let start = std::time::Instant::now();
        let mut last_err: Option<MetaError> = None;
        for attempt in 0..TXN_MAX_RETRIES {
            if ctx.is_cancelled() {
                return Err(MetaError::Interrupted);
            }
            let outcome = async {
                let mut tx = self.pool.begin().await?;
                let value = f(&mut *tx).await?;
                tx.commit().await?;
                Ok::<T, MetaError>(value)
            }
            .await;
            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::warn!(
                            op,
                            tries = attempt + 1,
                            elapsed = ?start.elapsed(),
                            "transaction succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if e.should_retry() => {
                    tracing::debug!(op, tries = attempt + 1, error = %e, "transaction failed, restarting");
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_millis(attempt * attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
        tracing::warn!(op, tries = TXN_MAX_RETRIES, "transaction retry budget exhausted");
        match last_err {
            Some(e) => Err(e),
            None => Err(MetaError::Interrupted),
        }
    }

    /// Run a read-only closure with the same retry envelope as [`Self::txn`].
    async fn read_txn<T, F>(&self, ctx: &OpContext, op: &'static str, f: F) -> Result<T, MetaError>
    where
        F: for<'p> Fn(&'p SqlitePool) -> BoxFuture<'p, Result<T, MetaError>>,
    {
        let mut last_err: Option<MetaError> = None;
        for attempt in 0..TXN_MAX_RETRIES {
            if ctx.is_cancelled() {
                return Err(MetaError::Interrupted);
            }
            match f(&self.pool).await {
                Ok(value) => return Ok(value),
                Err(e) if e.should_retry() => {
                    tracing::debug!(op, tries = attempt + 1, error = %e, "read failed, restarting");
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_millis(attempt * attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
        tracing::warn!(op, tries = TXN_MAX_RETRIES, "read retry budget exhausted");
        match last_err {
            Some(e) => Err(e),
            None => Err(MetaError::Interrupted),
        }
    }

    /// Create the schema if absent, persist the format descriptor, and make
    /// sure the root directory exists.
    ///
    /// Re-initializing an existing filesystem keeps its stored uuid; a
    /// mismatched name is rejected.
    pub async fn init(&self, format: Format) -> Result<Format, MetaError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }

        let existing: Option<String> =
            sqlx::query_scalar("SELECT value FROM nsfs_setting WHERE name = 'format'")
                .fetch_optional(&self.pool)
                .await?;

        let mut format = format;
        if let Some(raw) = existing {
            let old: Format = serde_json::from_str(&raw)?;
            if old.name != format.name {
                tracing::warn!(old = %old.name, new = %format.name, "refusing to rename an existing filesystem");
                return Err(MetaError::Invalid);
            }
            format.uuid = old.uuid;
        }
        let data = serde_json::to_string(&format)?;

        let (now, nowns) = now_micros();
        let (ctx, _handle) = keepalive_context();
        self.txn(&ctx, "init", |conn| {
            let data = data.clone();
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO nsfs_setting (name, value) VALUES ('format', ?)
                     ON CONFLICT (name) DO UPDATE SET value = excluded.value",
                )
                .bind(&data)
                .execute(&mut *conn)
                .await?;

                sqlx::query(
                    "INSERT INTO nsfs_setting (name, value) VALUES ('next_inode', ?)
                     ON CONFLICT (name) DO NOTHING",
                )
                .bind(FIRST_DYNAMIC_INODE.to_string())
                .execute(&mut *conn)
                .await?;

                // Root allows operations for every user; visibility is
                // enforced per edge.
                sqlx::query(
                    "INSERT INTO nsfs_node
                        (inode, type, mode, uid, gid, atime, mtime, ctime,
                         atimensec, mtimensec, ctimensec, nlink, length, rdev, parent)
                     VALUES (?, ?, ?, 0, 0, ?, ?, ?, ?, ?, ?, 2, 4096, 0, ?)
                     ON CONFLICT (inode) DO NOTHING",
                )
                .bind(ROOT_INODE.as_i64())
                .bind(NodeKind::Directory.as_u8())
                .bind(0o777)
                .bind(now)
                .bind(now)
                .bind(now)
                .bind(nowns)
                .bind(nowns)
                .bind(nowns)
                .bind(ROOT_INODE.as_i64())
                .execute(&mut *conn)
                .await?;

                Ok(())
            })
        })
        .await?;

        Ok(format)
    }

    /// Load the format descriptor.
    ///
    /// # Errors
    ///
    /// [`MetaError::NotFormatted`] if the schema or the format row is absent.
    pub async fn load(&self) -> Result<Format, MetaError> {
        let table: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'nsfs_setting'",
        )
        .fetch_optional(&self.pool)
        .await?;
        if table.is_none() {
            return Err(MetaError::NotFormatted);
        }

        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM nsfs_setting WHERE name = 'format'")
                .fetch_optional(&self.pool)
                .await?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(MetaError::NotFormatted),
        }
    }

    /// Resolve a username to its surrogate id.
    pub async fn get_user_id(&self, ctx: &OpContext, username: &str) -> Result<u32, MetaError> {
        let username = username.to_owned();
        self.read_txn(ctx, "get_user_id", |pool| {
            let username = username.clone();
            Box::pin(async move {
                let id: Option<i64> =
                    sqlx::query_scalar("SELECT id FROM nsfs_user WHERE username = ?")
                        .bind(username)
                        .fetch_optional(pool)
                        .await?;
                id.map(|v| v as u32).ok_or(MetaError::NotFound)
            })
        })
        .await
    }

    /// Insert a user row. The external login flow owns password hashing;
    /// this store only persists what it is given.
    pub async fn create_user(
        &self,
        ctx: &OpContext,
        username: &str,
        password: &str,
    ) -> Result<u32, MetaError> {
        let username = username.to_owned();
        let password = password.to_owned();
        self.txn(ctx, "create_user", |conn| {
            let username = username.clone();
            let password = password.clone();
            Box::pin(async move {
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO nsfs_user (username, password) VALUES (?, ?) RETURNING id",
                )
                .bind(username)
                .bind(password)
                .fetch_one(&mut *conn)
                .await
                .map_err(exists_on_unique)?;
                Ok(id as u32)
            })
        })
        .await
    }

    /// Allocate a fresh inode number. Numbers strictly increase and are
    /// never handed out twice, surviving restarts via the counter row.
    pub async fn next_inode(&self, ctx: &OpContext) -> Result<Ino, MetaError> {
        self.txn(ctx, "next_inode", |conn| {
            Box::pin(async move {
                let raw: Option<String> =
                    sqlx::query_scalar("SELECT value FROM nsfs_setting WHERE name = 'next_inode'")
                        .fetch_optional(&mut *conn)
                        .await?;
                let current: u64 = raw
                    .ok_or(MetaError::NotFormatted)?
                    .parse()
                    .map_err(|_| MetaError::NotFormatted)?;

                sqlx::query("UPDATE nsfs_setting SET value = ? WHERE name = 'next_inode'")
                    .bind((current + 1).to_string())
                    .execute(&mut *conn)
                    .await?;

                Ok(Ino(current))
            })
        })
        .await
    }

    /// Create a node and its incoming edge under `parent`.
    ///
    /// # Errors
    ///
    /// `ENOENT` if the parent is gone, `ENOTDIR` if it is a file, `EACCES`
    /// if it is not reachable by `user`, `EEXIST` if the encrypted name is
    /// already taken.
    #[allow(clippy::too_many_arguments)]
    pub async fn mknod(
        &self,
        ctx: &OpContext,
        parent: Ino,
        kind: NodeKind,
        mode: u16,
        user: u32,
        ino: Ino,
        encrypted_name: &[u8],
        wrapped_key: &[u8],
    ) -> Result<Attr, MetaError> {
        let encrypted_name = encrypted_name.to_vec();
        let wrapped_key = wrapped_key.to_vec();
        self.txn(ctx, "mknod", |conn| {
            let encrypted_name = encrypted_name.clone();
            let wrapped_key = wrapped_key.clone();
            Box::pin(async move {
                let parent_row = sqlx::query("SELECT type, uid FROM nsfs_node WHERE inode = ?")
                    .bind(parent.as_i64())
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(MetaError::NotFound)?;
                if !NodeKind::from_u8(parent_row.get::<i64, _>("type") as u8).is_dir() {
                    return Err(MetaError::NotDir);
                }
                let parent_uid = parent_row.get::<i64, _>("uid") as u32;
                if parent != ROOT_INODE && parent_uid != user {
                    return Err(MetaError::Access);
                }

                let taken: Option<i64> = sqlx::query_scalar(
                    "SELECT inode FROM nsfs_edge WHERE parent = ? AND name = ?",
                )
                .bind(parent.as_i64())
                .bind(encrypted_name.clone())
                .fetch_optional(&mut *conn)
                .await?;
                if taken.is_some() {
                    return Err(MetaError::Exists);
                }

                let (now, nowns) = now_micros();
                let nlink: u32 = if kind.is_dir() { 2 } else { 1 };
                let length: u64 = if kind.is_dir() { 4096 } else { 0 };

                sqlx::query(
                    "INSERT INTO nsfs_node
                        (inode, type, mode, uid, gid, atime, mtime, ctime,
                         atimensec, mtimensec, ctimensec, nlink, length, rdev, parent)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
                )
                .bind(ino.as_i64())
                .bind(kind.as_u8())
                .bind(mode)
                .bind(user)
                .bind(user)
                .bind(now)
                .bind(now)
                .bind(now)
                .bind(nowns)
                .bind(nowns)
                .bind(nowns)
                .bind(nlink)
                .bind(length as i64)
                .bind(parent.as_i64())
                .execute(&mut *conn)
                .await
                .map_err(exists_on_unique)?;

                sqlx::query(
                    "INSERT INTO nsfs_edge (parent, name, inode, type, key, recipient)
                     VALUES (?, ?, ?, ?, ?, NULL)",
                )
                .bind(parent.as_i64())
                .bind(encrypted_name)
                .bind(ino.as_i64())
                .bind(kind.as_u8())
                .bind(wrapped_key)
                .execute(&mut *conn)
                .await
                .map_err(exists_on_unique)?;

                if kind.is_dir() {
                    sqlx::query(
                        "UPDATE nsfs_node
                         SET nlink = nlink + 1, mtime = ?, mtimensec = ?, ctime = ?, ctimensec = ?
                         WHERE inode = ?",
                    )
                    .bind(now)
                    .bind(nowns)
                    .bind(now)
                    .bind(nowns)
                    .bind(parent.as_i64())
                    .execute(&mut *conn)
                    .await?;
                }

                let (secs, nanos) = split_time(now, nowns);
                Ok(Attr {
                    kind,
                    mode,
                    uid: user,
                    gid: user,
                    atime: secs,
                    atimensec: nanos,
                    mtime: secs,
                    mtimensec: nanos,
                    ctime: secs,
                    ctimensec: nanos,
                    nlink,
                    length,
                    rdev: 0,
                    parent,
                })
            })
        })
        .await
    }

    /// Verify the edge `(parent, child)` exists and is visible to `user`,
    /// and load the child's attributes.
    pub async fn lookup(
        &self,
        ctx: &OpContext,
        user: u32,
        parent: Ino,
        child: Ino,
    ) -> Result<Attr, MetaError> {
        self.read_txn(ctx, "lookup", |pool| {
            Box::pin(async move {
                if parent == SHARED_INODE {
                    let row = sqlx::query(
                        "SELECT n.*, e.recipient FROM nsfs_edge e
                         JOIN nsfs_node n ON n.inode = e.inode
                         WHERE e.parent = ? AND e.inode = ?",
                    )
                    .bind(parent.as_i64())
                    .bind(child.as_i64())
                    .fetch_optional(pool)
                    .await?
                    .ok_or(MetaError::NotFound)?;
                    let recipient: Option<i64> = row.get("recipient");
                    if recipient != Some(user as i64) {
                        return Err(MetaError::Access);
                    }
                    return Ok(attr_from_row(&row));
                }

                let row = sqlx::query(
                    "SELECT n.* FROM nsfs_edge e
                     JOIN nsfs_node n ON n.inode = e.inode
                     WHERE e.parent = ? AND e.inode = ? AND e.recipient IS NULL",
                )
                .bind(parent.as_i64())
                .bind(child.as_i64())
                .fetch_optional(pool)
                .await?
                .ok_or(MetaError::NotFound)?;
                let attr = attr_from_row(&row);
                if child != SHARED_INODE && attr.uid != user {
                    return Err(MetaError::Access);
                }
                Ok(attr)
            })
        })
        .await
    }

    /// Fetch the wrapped key of a node's primary incoming edge.
    pub async fn get_key(&self, ctx: &OpContext, ino: Ino) -> Result<Vec<u8>, MetaError> {
        self.read_txn(ctx, "get_key", |pool| {
            Box::pin(async move {
                let key: Option<Vec<u8>> = sqlx::query_scalar(
                    "SELECT key FROM nsfs_edge WHERE inode = ? AND recipient IS NULL",
                )
                .bind(ino.as_i64())
                .fetch_optional(pool)
                .await?;
                key.ok_or(MetaError::NotFound)
            })
        })
        .await
    }

    /// Fetch the wrapped key of a shared edge directed at `user`.
    pub async fn get_shared_key(
        &self,
        ctx: &OpContext,
        user: u32,
        ino: Ino,
    ) -> Result<Vec<u8>, MetaError> {
        self.read_txn(ctx, "get_shared_key", |pool| {
            Box::pin(async move {
                let key: Option<Vec<u8>> = sqlx::query_scalar(
                    "SELECT key FROM nsfs_edge WHERE inode = ? AND parent = ? AND recipient = ?",
                )
                .bind(ino.as_i64())
                .bind(SHARED_INODE.as_i64())
                .bind(user)
                .fetch_optional(pool)
                .await?;
                key.ok_or(MetaError::NotFound)
            })
        })
        .await
    }

    /// Load the attributes of a node.
    pub async fn get_attr(&self, ctx: &OpContext, ino: Ino) -> Result<Attr, MetaError> {
        self.read_txn(ctx, "get_attr", |pool| {
            Box::pin(async move {
                let row = sqlx::query("SELECT * FROM nsfs_node WHERE inode = ?")
                    .bind(ino.as_i64())
                    .fetch_optional(pool)
                    .await?
                    .ok_or(MetaError::NotFound)?;
                Ok(attr_from_row(&row))
            })
        })
        .await
    }

    /// Apply the requested attribute changes; each field is applied only if
    /// present in the request. Length changes are truncation and apply to
    /// files only; the caller re-puts the blob.
    pub async fn set_attr(
        &self,
        ctx: &OpContext,
        ino: Ino,
        req: &SetAttrRequest,
    ) -> Result<Attr, MetaError> {
        let req = req.clone();
        self.txn(ctx, "set_attr", |conn| {
            let req = req.clone();
            Box::pin(async move {
                let row = sqlx::query("SELECT * FROM nsfs_node WHERE inode = ?")
                    .bind(ino.as_i64())
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(MetaError::NotFound)?;
                let mut attr = attr_from_row(&row);

                if req.length.is_some() && attr.kind.is_dir() {
                    return Err(MetaError::IsDir);
                }

                if let Some(mode) = req.mode {
                    attr.mode = mode;
                }
                if let Some(uid) = req.uid {
                    attr.uid = uid;
                }
                if let Some(gid) = req.gid {
                    attr.gid = gid;
                }
                if let Some(length) = req.length {
                    attr.length = length;
                }
                if let Some((secs, nanos)) = req.atime {
                    attr.atime = secs;
                    attr.atimensec = nanos;
                }
                if let Some((secs, nanos)) = req.mtime {
                    attr.mtime = secs;
                    attr.mtimensec = nanos;
                }
                let (now, nowns) = now_micros();
                let (csecs, cnanos) = split_time(now, nowns);
                attr.ctime = csecs;
                attr.ctimensec = cnanos;

                sqlx::query(
                    "UPDATE nsfs_node
                     SET mode = ?, uid = ?, gid = ?, length = ?,
                         atime = ?, atimensec = ?, mtime = ?, mtimensec = ?,
                         ctime = ?, ctimensec = ?
                     WHERE inode = ?",
                )
                .bind(attr.mode)
                .bind(attr.uid)
                .bind(attr.gid)
                .bind(attr.length as i64)
                .bind(attr.atime * 1_000_000 + (attr.atimensec / 1_000) as i64)
                .bind((attr.atimensec % 1_000) as i64)
                .bind(attr.mtime * 1_000_000 + (attr.mtimensec / 1_000) as i64)
                .bind((attr.mtimensec % 1_000) as i64)
                .bind(now)
                .bind(nowns)
                .bind(ino.as_i64())
                .execute(&mut *conn)
                .await?;

                Ok(attr)
            })
        })
        .await
    }

    /// List every edge under `ino` visible to `user`.
    ///
    /// For the shared directory only edges directed at `user` are returned;
    /// elsewhere the user sees their own subtree plus the shared directory
    /// itself.
    pub async fn readdir(
        &self,
        ctx: &OpContext,
        ino: Ino,
        user: u32,
    ) -> Result<Vec<Entry>, MetaError> {
        self.read_txn(ctx, "readdir", |pool| {
            Box::pin(async move {
                let rows = if ino == SHARED_INODE {
                    sqlx::query(
                        "SELECT e.inode AS eino, e.name, e.key, e.type AS etype, n.*
                         FROM nsfs_edge e JOIN nsfs_node n ON n.inode = e.inode
                         WHERE e.parent = ? AND e.recipient = ?
                         ORDER BY e.id",
                    )
                    .bind(ino.as_i64())
                    .bind(user)
                    .fetch_all(pool)
                    .await?
                } else {
                    sqlx::query(
                        "SELECT e.inode AS eino, e.name, e.key, e.type AS etype, n.*
                         FROM nsfs_edge e JOIN nsfs_node n ON n.inode = e.inode
                         WHERE e.parent = ? AND e.recipient IS NULL
                           AND (n.uid = ? OR e.inode = ?)
                         ORDER BY e.id",
                    )
                    .bind(ino.as_i64())
                    .bind(user)
                    .bind(SHARED_INODE.as_i64())
                    .fetch_all(pool)
                    .await?
                };

                Ok(rows
                    .iter()
                    .map(|row| Entry {
                        ino: Ino(row.get::<i64, _>("eino") as u64),
                        name: row.get("name"),
                        key: row.get("key"),
                        kind: NodeKind::from_u8(row.get::<i64, _>("etype") as u8),
                        attr: attr_from_row(row),
                    })
                    .collect())
            })
        })
        .await
    }

    /// Record a write: extend the length to cover `offset + len` and bump
    /// mtime. The payload itself goes to the object store.
    pub async fn write(
        &self,
        ctx: &OpContext,
        ino: Ino,
        len: usize,
        offset: u64,
    ) -> Result<(), MetaError> {
        self.txn(ctx, "write", |conn| {
            Box::pin(async move {
                let row = sqlx::query("SELECT type FROM nsfs_node WHERE inode = ?")
                    .bind(ino.as_i64())
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(MetaError::NotFound)?;
                if NodeKind::from_u8(row.get::<i64, _>("type") as u8).is_dir() {
                    return Err(MetaError::IsDir);
                }

                let (now, nowns) = now_micros();
                sqlx::query(
                    "UPDATE nsfs_node
                     SET length = MAX(length, ?), mtime = ?, mtimensec = ?, ctime = ?, ctimensec = ?
                     WHERE inode = ?",
                )
                .bind((offset + len as u64) as i64)
                .bind(now)
                .bind(nowns)
                .bind(now)
                .bind(nowns)
                .bind(ino.as_i64())
                .execute(&mut *conn)
                .await?;
                Ok(())
            })
        })
        .await
    }

    /// Remove an empty directory and its incoming edge.
    pub async fn rmdir(&self, ctx: &OpContext, parent: Ino, ino: Ino) -> Result<(), MetaError> {
        self.txn(ctx, "rmdir", |conn| {
            Box::pin(async move {
                if ino == ROOT_INODE || ino == SHARED_INODE {
                    return Err(MetaError::Perm);
                }
                let row = sqlx::query("SELECT type FROM nsfs_node WHERE inode = ?")
                    .bind(ino.as_i64())
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(MetaError::NotFound)?;
                if !NodeKind::from_u8(row.get::<i64, _>("type") as u8).is_dir() {
                    return Err(MetaError::NotDir);
                }

                let children: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM nsfs_edge WHERE parent = ?")
                        .bind(ino.as_i64())
                        .fetch_one(&mut *conn)
                        .await?;
                if children > 0 {
                    return Err(MetaError::NotEmpty);
                }

                let deleted = sqlx::query("DELETE FROM nsfs_edge WHERE parent = ? AND inode = ?")
                    .bind(parent.as_i64())
                    .bind(ino.as_i64())
                    .execute(&mut *conn)
                    .await?;
                if deleted.rows_affected() == 0 {
                    return Err(MetaError::NotFound);
                }
                sqlx::query("DELETE FROM nsfs_node WHERE inode = ?")
                    .bind(ino.as_i64())
                    .execute(&mut *conn)
                    .await?;

                let (now, nowns) = now_micros();
                sqlx::query(
                    "UPDATE nsfs_node
                     SET nlink = nlink - 1, mtime = ?, mtimensec = ?, ctime = ?, ctimensec = ?
                     WHERE inode = ?",
                )
                .bind(now)
                .bind(nowns)
                .bind(now)
                .bind(nowns)
                .bind(parent.as_i64())
                .execute(&mut *conn)
                .await?;
                Ok(())
            })
        })
        .await
    }

    /// Remove the edge `(parent, ino)`; the node row goes once its link
    /// count reaches zero. The caller removes the blob.
    pub async fn unlink(&self, ctx: &OpContext, parent: Ino, ino: Ino) -> Result<(), MetaError> {
        self.txn(ctx, "unlink", |conn| {
            Box::pin(async move {
                let row = sqlx::query("SELECT type, nlink FROM nsfs_node WHERE inode = ?")
                    .bind(ino.as_i64())
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(MetaError::NotFound)?;
                if NodeKind::from_u8(row.get::<i64, _>("type") as u8).is_dir() {
                    return Err(MetaError::IsDir);
                }
                let nlink = row.get::<i64, _>("nlink") as u32;

                let deleted = sqlx::query("DELETE FROM nsfs_edge WHERE parent = ? AND inode = ?")
                    .bind(parent.as_i64())
                    .bind(ino.as_i64())
                    .execute(&mut *conn)
                    .await?;
                if deleted.rows_affected() == 0 {
                    return Err(MetaError::NotFound);
                }

                if nlink <= 1 {
                    sqlx::query("DELETE FROM nsfs_node WHERE inode = ?")
                        .bind(ino.as_i64())
                        .execute(&mut *conn)
                        .await?;
                } else {
                    let (now, nowns) = now_micros();
                    sqlx::query(
                        "UPDATE nsfs_node SET nlink = nlink - 1, ctime = ?, ctimensec = ?
                         WHERE inode = ?",
                    )
                    .bind(now)
                    .bind(nowns)
                    .bind(ino.as_i64())
                    .execute(&mut *conn)
                    .await?;
                }
                Ok(())
            })
        })
        .await
    }

    /// Create the `shared` directory and its edge under the root if absent.
    ///
    /// The edge carries a plaintext name and an empty wrapped key (the
    /// placeholder key chain), is visible to every user, and does not count
    /// toward the root's link accounting.
    pub async fn ensure_shared(&self, ctx: &OpContext) -> Result<(), MetaError> {
        self.txn(ctx, "ensure_shared", |conn| {
            Box::pin(async move {
                insert_shared_node(conn).await?;
                Ok(())
            })
        })
        .await
    }

    /// Wire a node into the shared directory for `recipient`.
    ///
    /// `wrapped_key` must be the node's secret wrapped under the recipient's
    /// RSA public key, and `encrypted_name` the name sealed under the node's
    /// own secret, so the recipient can chain through both at lookup time.
    pub async fn share(
        &self,
        ctx: &OpContext,
        ino: Ino,
        owner: u32,
        recipient: u32,
        encrypted_name: &[u8],
        wrapped_key: &[u8],
    ) -> Result<(), MetaError> {
        let encrypted_name = encrypted_name.to_vec();
        let wrapped_key = wrapped_key.to_vec();
        self.txn(ctx, "share", |conn| {
            let encrypted_name = encrypted_name.clone();
            let wrapped_key = wrapped_key.clone();
            Box::pin(async move {
                let row = sqlx::query("SELECT type, uid FROM nsfs_node WHERE inode = ?")
                    .bind(ino.as_i64())
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(MetaError::NotFound)?;
                if row.get::<i64, _>("uid") as u32 != owner {
                    return Err(MetaError::Access);
                }
                let kind = NodeKind::from_u8(row.get::<i64, _>("type") as u8);

                let known: Option<i64> = sqlx::query_scalar("SELECT id FROM nsfs_user WHERE id = ?")
                    .bind(recipient)
                    .fetch_optional(&mut *conn)
                    .await?;
                if known.is_none() {
                    return Err(MetaError::NotFound);
                }

                insert_shared_node(conn).await?;

                sqlx::query(
                    "INSERT INTO nsfs_edge (parent, name, inode, type, key, recipient)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(SHARED_INODE.as_i64())
                .bind(encrypted_name)
                .bind(ino.as_i64())
                .bind(kind.as_u8())
                .bind(wrapped_key)
                .bind(recipient)
                .execute(&mut *conn)
                .await
                .map_err(exists_on_unique)?;

                let (now, nowns) = now_micros();
                sqlx::query(
                    "UPDATE nsfs_node SET nlink = nlink + 1, ctime = ?, ctimensec = ?
                     WHERE inode = ?",
                )
                .bind(now)
                .bind(nowns)
                .bind(ino.as_i64())
                .execute(&mut *conn)
                .await?;
                Ok(())
            })
        })
        .await
    }
}

/// Insert the shared node row and its root edge if either is missing.
async fn insert_shared_node(conn: &mut SqliteConnection) -> Result<(), MetaError> {
    let (now, nowns) = now_micros();
    sqlx::query(
        "INSERT INTO nsfs_node
            (inode, type, mode, uid, gid, atime, mtime, ctime,
             atimensec, mtimensec, ctimensec, nlink, length, rdev, parent)
         VALUES (?, ?, ?, 0, 0, ?, ?, ?, ?, ?, ?, 2, 4096, 0, ?)
         ON CONFLICT (inode) DO NOTHING",
    )
    .bind(SHARED_INODE.as_i64())
    .bind(NodeKind::Directory.as_u8())
    .bind(0o777)
    .bind(now)
    .bind(now)
    .bind(now)
    .bind(nowns)
    .bind(nowns)
    .bind(nowns)
    .bind(ROOT_INODE.as_i64())
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO nsfs_edge (parent, name, inode, type, key, recipient)
         VALUES (?, ?, ?, ?, X'', NULL)
         ON CONFLICT (parent, name) DO NOTHING",
    )
    .bind(ROOT_INODE.as_i64())
    .bind(b"shared".as_slice())
    .bind(SHARED_INODE.as_i64())
    .bind(NodeKind::Directory.as_u8())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Map a uniqueness violation to `EEXIST`, passing everything else through.
fn exists_on_unique(e: sqlx::Error) -> MetaError {
    let err = MetaError::from(e);
    if err.is_unique_violation() {
        MetaError::Exists
    } else {
        err
    }
}

/// Decode a `nsfs_node` row into attributes, converting the stored
/// microsecond timestamps to seconds plus nanoseconds.
fn attr_from_row(row: &SqliteRow) -> Attr {
    let (atime, atimensec) = split_time(row.get("atime"), row.get("atimensec"));
    let (mtime, mtimensec) = split_time(row.get("mtime"), row.get("mtimensec"));
    let (ctime, ctimensec) = split_time(row.get("ctime"), row.get("ctimensec"));
    Attr {
        kind: NodeKind::from_u8(row.get::<i64, _>("type") as u8),
        mode: row.get::<i64, _>("mode") as u16,
        uid: row.get::<i64, _>("uid") as u32,
        gid: row.get::<i64, _>("gid") as u32,
        atime,
        atimensec,
        mtime,
        mtimensec,
        ctime,
        ctimensec,
        nlink: row.get::<i64, _>("nlink") as u32,
        length: row.get::<i64, _>("length") as u64,
        rdev: row.get::<i64, _>("rdev") as u32,
        parent: Ino(row.get::<i64, _>("parent") as u64),
    }
}

/// A context for store-internal operations that are not driven by a kernel
/// request and so have nothing to cancel them.
fn keepalive_context() -> (OpContext, CancelHandle) {
    let (handle, ctx) = op_context();
    (ctx, handle)
}
