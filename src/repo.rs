//! Owns the key-value environment, on-disk directory layout, session
//! cache, and the submission-sequence notifier that query tail-mode
//! waiters block on.

use crate::codec::TableId;
use crate::config::RepoConfig;
use crate::error::SlnResult;
use crate::ids::SubmissionSequence;
use crate::kv::memory::MemoryEnv;
use crate::kv::KvEnvironment;
use crate::session::SessionCache;
use crate::sync::SyncQueue;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

pub struct Repository {
    pub env: Arc<dyn KvEnvironment>,
    pub tmp_dir: PathBuf,
    pub internal_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub sessions: SessionCache,
    pub public_read: bool,
    /// Serializes batch-store commits: only one write transaction may be
    /// outstanding at a time.
    pub write_lock: Mutex<()>,
    /// Woken after every committed submission batch.
    pub notify: Notify,
    /// Hands committed files off to the sync scheduler's consumer loop.
    pub sync: Arc<SyncQueue>,
}

impl Repository {
    /// Creates the on-disk directory layout (idempotent) and opens the
    /// key-value environment.
    pub fn open(config: &RepoConfig) -> SlnResult<Arc<Repository>> {
        std::fs::create_dir_all(config.tmp_dir())?;
        set_dir_mode(&config.tmp_dir(), 0o700);
        std::fs::create_dir_all(config.data_dir())?;
        std::fs::create_dir_all(config.cache_dir())?;
        std::fs::create_dir_all(config.db_dir())?;

        Ok(Arc::new(Repository {
            env: Arc::new(MemoryEnv::new()),
            tmp_dir: config.tmp_dir(),
            internal_dir: config.data_dir(),
            cache_dir: config.cache_dir(),
            sessions: SessionCache::new(),
            public_read: config.public_read,
            write_lock: Mutex::new(()),
            notify: Notify::new(),
            sync: SyncQueue::new(),
        }))
    }

    /// In-memory repository for tests: no filesystem directories.
    pub fn in_memory(tmp_dir: PathBuf, internal_dir: PathBuf, cache_dir: PathBuf) -> Arc<Repository> {
        Self::in_memory_with_config(tmp_dir, internal_dir, cache_dir, false)
    }

    pub fn in_memory_with_config(
        tmp_dir: PathBuf,
        internal_dir: PathBuf,
        cache_dir: PathBuf,
        public_read: bool,
    ) -> Arc<Repository> {
        Arc::new(Repository {
            env: Arc::new(MemoryEnv::new()),
            tmp_dir,
            internal_dir,
            cache_dir,
            sessions: SessionCache::new(),
            public_read,
            write_lock: Mutex::new(()),
            notify: Notify::new(),
            sync: SyncQueue::new(),
        })
    }

    pub fn internal_path(&self, hash_hex: &str) -> PathBuf {
        let shard = &hash_hex[..2.min(hash_hex.len())];
        self.internal_dir.join(shard).join(hash_hex)
    }

    /// Invariant 6 (`spec.md` line 47): a session may read a file only if
    /// ownership or the repo-wide public-read flag permits it. There is
    /// no per-file public flag — `spec.md`'s non-goals exclude ACL beyond
    /// per-user ownership of submissions, so `public_read` is the only
    /// "public" a file can be.
    pub fn can_read(&self, session: &crate::session::Session, row: &crate::submission::FileRow) -> bool {
        self.public_read || session.user_id == row.owner_id()
    }

    /// Returns the next submission-sequence id under `txn`, scanning the
    /// table's max existing key — the same approach as `db_next_id` in
    /// `db_schema.c`.
    pub fn next_submission_sequence(
        &self,
        txn: &dyn crate::kv::KvTransaction,
    ) -> SlnResult<SubmissionSequence> {
        let mut cursor = txn.range(TableId::SubmissionSequence, &[], &[0xff; 9])?;
        let mut max = 0u64;
        while let Some((key, _)) = cursor.next(true) {
            let (id, _) = crate::codec::decode_varint(&key)?;
            if id > max {
                max = id;
            }
        }
        Ok(SubmissionSequence(max + 1))
    }
}

/// Allocates the next 64-bit row id for `table`, using a reserved
/// single-byte counter key (`0xff`) that never collides with a real row
/// key: every row key in `Files`/`Uris` begins with an ASCII hex digit or
/// URI scheme byte, both well below `0xff`.
pub fn alloc_id(txn: &dyn crate::kv::KvTransaction, table: TableId) -> SlnResult<u64> {
    const COUNTER_KEY: [u8; 1] = [0xff];
    let current = match txn.get(table, &COUNTER_KEY)? {
        Some(v) => crate::codec::decode_varint(&v)?.0,
        None => 0,
    };
    let next = current + 1;
    let mut buf = Vec::new();
    crate::codec::encode_varint(next, &mut buf);
    txn.put(table, &COUNTER_KEY, &buf)?;
    Ok(next)
}

#[cfg(unix)]
fn set_dir_mode(path: &std::path::Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(mode);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_dir_mode(_path: &std::path::Path, _mode: u32) {}
