//! Submission state machine: `Open` → `Writing` → `Hashed`, followed by a
//! batch `Store` that moves a group of hashed submissions through
//! `Stored` to `Committed` in one transaction. Grounded in
//! `EFSSubmission.c`'s temp-file-then-hardlink lifecycle and its
//! single-transaction batch commit.

use crate::codec::{self, KeyBuilder, TableId};
use crate::error::{SlnError, SlnResult};
use crate::hasher::{HashOutput, Hasher};
use crate::ids::{FileId, SubmissionSequence, UriId, UserId};
use crate::kv::KvTransaction;
use crate::metafile::MetaFileExtractor;
use crate::repo::{alloc_id, Repository};
use crate::session::{Session, SessionMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SubmissionState {
    Open,
    Writing,
    Hashed,
    Committed,
    Aborted,
}

/// One file on its way into the repository. Not `Clone`: a submission
/// owns a temp file descriptor and must flow through `end` and
/// `store_batch` exactly once.
pub struct Submission {
    repo: Arc<Repository>,
    owner: Option<UserId>,
    claimed_type: String,
    target_uri: Option<String>,
    temp_path: PathBuf,
    temp_file: Option<tokio::fs::File>,
    hasher: Option<Hasher>,
    extractor: MetaFileExtractor,
    size: u64,
    hash_output: Option<HashOutput>,
    state: SubmissionState,
}

/// What a committed submission resolved to, returned to the HTTP layer
/// for response-URI construction.
#[derive(Clone, Debug)]
pub struct StoredFile {
    pub file_id: FileId,
    pub sort_id: SubmissionSequence,
    pub primary_uri: String,
    pub internal_hash_hex: String,
    /// Whether this submission's claimed type marks it as a meta-file,
    /// for routing the post-commit sync handoff to `metaq` vs `fileq`.
    pub is_meta: bool,
}

impl Submission {
    /// Opens a temp file under the repository's temp directory. Fails
    /// with `EACCES` unless `session` is read-write.
    pub async fn create(
        repo: Arc<Repository>,
        session: &Session,
        claimed_type: &str,
        target_uri: Option<&str>,
    ) -> SlnResult<Submission> {
        if session.mode != SessionMode::ReadWrite {
            return Err(SlnError::Eacces);
        }
        let name = crate::nonce::random_token(16);
        let temp_path = repo.tmp_dir.join(name);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;
        set_file_mode(&temp_path, 0o400);

        Ok(Submission {
            repo,
            owner: session.user_id,
            claimed_type: claimed_type.to_string(),
            target_uri: target_uri.map(str::to_string),
            temp_path,
            temp_file: Some(file),
            hasher: Some(Hasher::new()),
            extractor: MetaFileExtractor::new(claimed_type),
            size: 0,
            hash_output: None,
            state: SubmissionState::Open,
        })
    }

    /// Appends `bytes` to the temp file and feeds every tracked digest
    /// and the meta-file extractor. Fails with `EINVAL` once `end` has
    /// already been called.
    pub async fn write(&mut self, bytes: &[u8]) -> SlnResult<()> {
        if !matches!(self.state, SubmissionState::Open | SubmissionState::Writing) {
            return Err(SlnError::Einval("write on a submission that has already ended".into()));
        }
        self.state = SubmissionState::Writing;
        let file = self
            .temp_file
            .as_mut()
            .ok_or_else(|| SlnError::Panic("submission lost its temp file handle".into()))?;
        file.write_all(bytes).await?;
        self.hasher
            .as_mut()
            .expect("hasher present until end()")
            .write(bytes);
        self.extractor.write(bytes);
        self.size += bytes.len() as u64;
        Ok(())
    }

    /// Closes the temp file and finalizes the digests. Idempotent.
    pub async fn end(&mut self) -> SlnResult<()> {
        if self.state == SubmissionState::Hashed {
            return Ok(());
        }
        if let Some(mut file) = self.temp_file.take() {
            file.flush().await?;
        }
        if let Some(hasher) = self.hasher.take() {
            self.hash_output = Some(hasher.finish());
        }
        self.state = SubmissionState::Hashed;
        Ok(())
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn primary_uri(&self) -> Option<&str> {
        self.hash_output.as_ref().map(|h| h.primary().as_str())
    }

    /// Commits a batch of already-hashed submissions as a single
    /// transaction: hard-links every temp file into `internal/<shard>/
    /// <hash>` (idempotent — `AlreadyExists` is success), inserts File,
    /// URI, link, and tag rows, assigns the next submission-sequence id
    /// to each, commits, and wakes tail-mode waiters. On any failure the
    /// transaction is never committed and every submission's temp file
    /// is removed.
    pub async fn store_batch(repo: &Arc<Repository>, mut subs: Vec<Submission>) -> SlnResult<Vec<StoredFile>> {
        for s in &subs {
            if s.state != SubmissionState::Hashed {
                return Err(SlnError::Einval("submission must be ended before it can be stored".into()));
            }
        }

        let _write_guard = repo.write_lock.lock().await;
        let result = Self::store_batch_sync(repo, &mut subs);

        match &result {
            Ok(stored) => {
                for s in &mut subs {
                    s.state = SubmissionState::Committed;
                }
                repo.notify.notify_waiters();
                // Hand each committed file to the sync scheduler without
                // blocking this request: `producer_ingest` doesn't return
                // until the consumer loop reports `WorkDone`.
                for sf in stored {
                    let sync = repo.sync.clone();
                    let item = crate::sync::WorkItem { file_id: sf.file_id, is_meta: sf.is_meta };
                    tokio::spawn(async move {
                        sync.producer_ingest(item).await;
                    });
                }
            }
            Err(_) => {
                for s in &subs {
                    let _ = std::fs::remove_file(&s.temp_path);
                }
            }
        }
        result
    }

    /// The synchronous half of `store_batch`: everything here touches
    /// only the filesystem and the key-value transaction, with no
    /// `.await` points, so the transaction never needs to be `Send`.
    fn store_batch_sync(repo: &Arc<Repository>, subs: &mut [Submission]) -> SlnResult<Vec<StoredFile>> {
        let txn = repo.env.begin(true)?;
        let mut stored = Vec::with_capacity(subs.len());

        for sub in subs.iter_mut() {
            let hash_output = sub
                .hash_output
                .as_ref()
                .ok_or_else(|| SlnError::Panic("committed submission has no hash".into()))?;
            let internal_hash = hash_output.internal_hash_hex.clone();
            let internal_path = repo.internal_path(&internal_hash);
            if let Some(parent) = internal_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match std::fs::hard_link(&sub.temp_path, &internal_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
            let _ = std::fs::remove_file(&sub.temp_path);

            let primary_uri_id = intern_uri(&*txn, hash_output.primary().as_str())?;
            let (file_id, created) = find_or_create_file(
                &*txn,
                &internal_hash,
                &sub.claimed_type,
                sub.size,
                primary_uri_id,
                hash_output.primary().as_str(),
                sub.owner,
            )?;

            for uri in &hash_output.uris {
                link_uri_to_file(&*txn, uri.as_str(), file_id)?;
            }
            if let Some(target) = &sub.target_uri {
                link_uri_to_file(&*txn, target, file_id)?;
            }

            let extractor = std::mem::replace(&mut sub.extractor, MetaFileExtractor::new(""));
            let (meta_target, tags) = extractor.end();
            if let Some(target_uri) = meta_target {
                let target_id = intern_uri(&*txn, &target_uri)?;
                mark_meta_file(&*txn, file_id, target_id)?;
                for tag in tags {
                    insert_tag(&*txn, target_id, &tag.field, &tag.value, file_id)?;
                }
            }

            // A duplicate submission of already-known content reuses the
            // file's original submission-sequence id rather than minting
            // a new one, so storing the same content twice is idempotent
            // from the submission-sequence's point of view.
            let mut file_id_bytes = Vec::new();
            codec::encode_varint(file_id.get(), &mut file_id_bytes);
            let seq = if created {
                let seq = repo.next_submission_sequence(&*txn)?;
                let mut seq_key = Vec::new();
                codec::encode_varint(seq.0, &mut seq_key);
                txn.put(TableId::SubmissionSequence, &seq_key, &file_id_bytes)?;
                txn.put(TableId::SubmittedFiles, &file_id_bytes, &seq_key)?;
                seq
            } else {
                let seq_key = txn
                    .get(TableId::SubmittedFiles, &file_id_bytes)?
                    .ok_or_else(|| SlnError::Panic("existing file has no submission-sequence row".into()))?;
                let (seq_val, _) = codec::decode_varint(&seq_key)?;
                SubmissionSequence(seq_val)
            };

            stored.push(StoredFile {
                file_id,
                sort_id: seq,
                primary_uri: hash_output.primary().as_str().to_string(),
                internal_hash_hex: internal_hash,
                is_meta: sub.claimed_type == crate::metafile::META_FILE_MIME_TYPE,
            });
        }

        txn.commit()?;
        Ok(stored)
    }
}

impl Drop for Submission {
    /// An aborted (never stored) submission's temp file is garbage; best
    /// effort removal, same as `EFSSubmission.c`'s cleanup on a dropped
    /// submission handle.
    fn drop(&mut self) {
        if !matches!(self.state, SubmissionState::Committed) {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

/// Row stored in the `Files` table, keyed by internal (SHA-256) hash hex.
/// `primary_uri_id` lets the filter engine treat a file's own canonical
/// content URI as a tag target without a second table; `primary_uri`
/// lets the query streamer render a result list without one either.
/// `owner` is the submitting session's user, if any (`None` for an
/// anonymous submission); read access is gated on it per invariant 6 —
/// see `Repository::can_read`.
#[derive(Serialize, Deserialize)]
pub(crate) struct FileRow {
    pub id: u64,
    pub mime_type: String,
    pub size: u64,
    pub primary_uri_id: u64,
    pub primary_uri: String,
    pub owner: Option<u64>,
}

impl FileRow {
    pub fn owner_id(&self) -> Option<UserId> {
        self.owner.map(UserId)
    }
}

#[derive(Serialize, Deserialize)]
struct UriRow {
    id: u64,
}

/// `Files` is keyed by hash hex, not by id, so resolving a `FileId` back
/// to its row scans the table. Acceptable for the in-memory store and
/// the scale this repository targets (a single-user archive); a
/// production-scale store would add an id -> hash secondary index.
pub(crate) fn load_file_row(txn: &dyn KvTransaction, file_id: FileId) -> SlnResult<Option<FileRow>> {
    let mut cursor = txn.range(TableId::Files, &[0x00], &[0xfe])?;
    while let Some((_, raw)) = cursor.next(true) {
        let row: FileRow =
            serde_json::from_slice(&raw).map_err(|e| SlnError::Panic(format!("corrupt file row: {e}")))?;
        if row.id == file_id.get() {
            return Ok(Some(row));
        }
    }
    Ok(None)
}

/// Creates the `Files` row for `internal_hash_hex` if none exists yet, or
/// returns the existing file's id on a hash match. A second submission of
/// already-known content is a silent deduplication (per `spec.md` §9's
/// open question on concurrent same-URI submission): the original
/// submitter's `owner` is kept, not overwritten by the later submitter.
/// Returns the file id and whether a new `Files` row was created (`false`
/// on a dedup match), so the caller knows whether to mint a fresh
/// submission-sequence id or reuse the existing one.
fn find_or_create_file(
    txn: &dyn KvTransaction,
    internal_hash_hex: &str,
    mime_type: &str,
    size: u64,
    primary_uri_id: UriId,
    primary_uri: &str,
    owner: Option<UserId>,
) -> SlnResult<(FileId, bool)> {
    let key = internal_hash_hex.as_bytes();
    if let Some(raw) = txn.get(TableId::Files, key)? {
        let row: FileRow =
            serde_json::from_slice(&raw).map_err(|e| SlnError::Panic(format!("corrupt file row: {e}")))?;
        return Ok((FileId(row.id), false));
    }
    let id = alloc_id(txn, TableId::Files)?;
    let row = FileRow {
        id,
        mime_type: mime_type.to_string(),
        size,
        primary_uri_id: primary_uri_id.get(),
        primary_uri: primary_uri.to_string(),
        owner: owner.map(UserId::get),
    };
    txn.put(TableId::Files, key, &serde_json::to_vec(&row).expect("FileRow serializes"))?;
    Ok((FileId(id), true))
}

pub(crate) fn intern_uri(txn: &dyn KvTransaction, uri: &str) -> SlnResult<UriId> {
    let key = uri.as_bytes();
    if let Some(raw) = txn.get(TableId::Uris, key)? {
        let row: UriRow =
            serde_json::from_slice(&raw).map_err(|e| SlnError::Panic(format!("corrupt uri row: {e}")))?;
        return Ok(UriId(row.id));
    }
    let id = alloc_id(txn, TableId::Uris)?;
    txn.put(
        TableId::Uris,
        key,
        &serde_json::to_vec(&UriRow { id }).expect("UriRow serializes"),
    )?;
    Ok(UriId(id))
}

/// Resolves a target file id through `MetaMaps` (the file's own parsed
/// link target, if it is a meta-file) back to the file that owns that
/// target URI, via `UrisByFile`.
pub(crate) fn meta_target_file_id(txn: &dyn KvTransaction, meta_file_id: FileId) -> SlnResult<Option<FileId>> {
    let mut key = Vec::new();
    codec::encode_varint(meta_file_id.get(), &mut key);
    let Some(val) = txn.get(TableId::MetaMaps, &key)? else {
        return Ok(None);
    };
    let (target_uri_id, _) = codec::decode_varint(&val)?;
    let mut reverse_key = Vec::new();
    codec::encode_varint(target_uri_id, &mut reverse_key);
    let Some(fv) = txn.get(TableId::UrisByFile, &reverse_key)? else {
        return Ok(None);
    };
    let (fid, _) = codec::decode_varint(&fv)?;
    Ok(Some(FileId(fid)))
}

/// Resolves a URI string straight to the file it names, if any.
pub(crate) fn resolve_file_id_by_uri(txn: &dyn KvTransaction, uri: &str) -> SlnResult<Option<FileId>> {
    let Some(raw) = txn.get(TableId::Uris, uri.as_bytes())? else {
        return Ok(None);
    };
    let row: UriRow =
        serde_json::from_slice(&raw).map_err(|e| SlnError::Panic(format!("corrupt uri row: {e}")))?;
    let mut key = Vec::new();
    codec::encode_varint(row.id, &mut key);
    let Some(val) = txn.get(TableId::UrisByFile, &key)? else {
        return Ok(None);
    };
    let (fid, _) = codec::decode_varint(&val)?;
    Ok(Some(FileId(fid)))
}

/// Records a file-URI link in both directions: `FileUris` enumerates a
/// file's URIs; `UrisByFile` resolves a URI straight to its file.
fn link_uri_to_file(txn: &dyn KvTransaction, uri: &str, file_id: FileId) -> SlnResult<()> {
    let uri_id = intern_uri(txn, uri)?;

    let mut forward = Vec::new();
    codec::encode_varint(file_id.get(), &mut forward);
    codec::encode_varint(uri_id.get(), &mut forward);
    txn.put(TableId::FileUris, &forward, &[])?;

    let mut reverse_key = Vec::new();
    codec::encode_varint(uri_id.get(), &mut reverse_key);
    let mut reverse_val = Vec::new();
    codec::encode_varint(file_id.get(), &mut reverse_val);
    txn.put(TableId::UrisByFile, &reverse_key, &reverse_val)
}

fn mark_meta_file(txn: &dyn KvTransaction, file_id: FileId, target_uri_id: UriId) -> SlnResult<()> {
    let mut key = Vec::new();
    codec::encode_varint(file_id.get(), &mut key);
    let mut val = Vec::new();
    codec::encode_varint(target_uri_id.get(), &mut val);
    txn.put(TableId::MetaMaps, &key, &val)
}

/// Inserts a tag triple into both the by-target index (`Tags`, used by
/// `LinksTo`/target-scoped lookups) and the by-field/value index
/// (`TagsByTarget`, used by `Badge` lookups).
fn insert_tag(txn: &dyn KvTransaction, target_id: UriId, field: &str, value: &str, source_file_id: FileId) -> SlnResult<()> {
    let (kb, e1) = KeyBuilder::table(TableId::Tags).u64(target_id.get()).string(Some(field));
    let (kb, e2) = kb.string(Some(value));
    let key = kb.u64(source_file_id.get()).build();
    put_intern(txn, e1)?;
    put_intern(txn, e2)?;
    txn.put(TableId::Tags, &key, &[])?;

    let (kb, e1) = KeyBuilder::table(TableId::TagsByTarget).string(Some(field));
    let (kb, e2) = kb.string(Some(value));
    let key = kb.u64(target_id.get()).build();
    put_intern(txn, e1)?;
    put_intern(txn, e2)?;
    txn.put(TableId::TagsByTarget, &key, &[])
}

fn put_intern(txn: &dyn KvTransaction, entry: Option<(Vec<u8>, Vec<u8>)>) -> SlnResult<()> {
    if let Some((key, value)) = entry {
        txn.put(TableId::StringTable, &key, &value)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_file_mode(path: &std::path::Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(mode);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_file_mode(_path: &std::path::Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionCache;
    use tempfile::tempdir;

    fn rw_session(cache: &SessionCache) -> Session {
        let mut s = Session::anonymous(cache.alloc_id(), false);
        s.mode = SessionMode::ReadWrite;
        s.user_id = Some(UserId(1));
        s
    }

    async fn test_repo() -> (Arc<Repository>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tmp")).unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::create_dir_all(dir.path().join("cache")).unwrap();
        let repo = Repository::in_memory(
            dir.path().join("tmp"),
            dir.path().join("data"),
            dir.path().join("cache"),
        );
        (repo, dir)
    }

    #[tokio::test]
    async fn create_requires_read_write_session() {
        let (repo, _dir) = test_repo().await;
        let cache = SessionCache::new();
        let ro_session = Session::anonymous(cache.alloc_id(), true);
        let result = Submission::create(repo, &ro_session, "text/plain", None).await;
        assert!(matches!(result, Err(SlnError::Eacces)));
    }

    #[tokio::test]
    async fn write_then_end_produces_expected_hash() {
        let (repo, _dir) = test_repo().await;
        let cache = SessionCache::new();
        let session = rw_session(&cache);
        let mut sub = Submission::create(repo, &session, "text/plain", None).await.unwrap();
        sub.write(b"hello\n").await.unwrap();
        sub.end().await.unwrap();
        assert_eq!(
            sub.primary_uri(),
            Some("hash://sha256/5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03")
        );
    }

    #[tokio::test]
    async fn store_batch_dedups_identical_content() {
        let (repo, _dir) = test_repo().await;
        let cache = SessionCache::new();
        let session = rw_session(&cache);

        let mut sub_a = Submission::create(repo.clone(), &session, "text/plain", None).await.unwrap();
        sub_a.write(b"same bytes").await.unwrap();
        sub_a.end().await.unwrap();
        let mut sub_b = Submission::create(repo.clone(), &session, "text/plain", None).await.unwrap();
        sub_b.write(b"same bytes").await.unwrap();
        sub_b.end().await.unwrap();

        let stored = Submission::store_batch(&repo, vec![sub_a, sub_b]).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].file_id, stored[1].file_id);
        // Storing the same content twice is idempotent: the second
        // submission is a silent dedup and reuses the first's
        // submission-sequence id rather than minting a new one.
        assert_eq!(stored[0].sort_id, stored[1].sort_id);
    }

    #[tokio::test]
    async fn store_batch_extracts_meta_file_tags() {
        let (repo, _dir) = test_repo().await;
        let cache = SessionCache::new();
        let session = rw_session(&cache);

        let mut sub = Submission::create(repo.clone(), &session, crate::metafile::META_FILE_MIME_TYPE, None)
            .await
            .unwrap();
        sub.write(b"hash://sha256/deadbeef\ntag: example\n").await.unwrap();
        sub.end().await.unwrap();
        let stored = Submission::store_batch(&repo, vec![sub]).await.unwrap();
        assert_eq!(stored.len(), 1);

        let txn = repo.env.begin(false).unwrap();
        let mut key = Vec::new();
        codec::encode_varint(stored[0].file_id.get(), &mut key);
        assert!(txn.get(TableId::MetaMaps, &key).unwrap().is_some());
    }
}
