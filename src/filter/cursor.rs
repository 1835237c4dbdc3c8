//! Evaluates a `Filter` over the submission-sequence stream.
//!
//! The reference store here is small enough (a single-user archive, per
//! `spec.md` §1) that secondary per-filter-kind indexes buy little: this
//! cursor walks the `SubmissionSequence` table in sort order and tests
//! each candidate against the filter tree's boolean predicate, skipping
//! non-matches. And/Or/Not compose as ordinary boolean combinators
//! rather than as separate merge-join/union/complement cursor types —
//! correct and order-preserving, though a zig-zag join over secondary
//! indexes would touch fewer rows at larger scale.

use crate::codec::{self, TableId};
use crate::error::SlnResult;
use crate::ids::{FileId, SubmissionSequence};
use crate::kv::KvTransaction;
use crate::submission::{load_file_row, meta_target_file_id, resolve_file_id_by_uri};

use super::tree::Filter;

/// Tests whether `file_id` satisfies `filter` under `txn`.
pub fn matches(txn: &dyn KvTransaction, filter: &Filter, file_id: FileId) -> SlnResult<bool> {
    match filter {
        Filter::All => Ok(true),
        Filter::MetaFile => {
            let mut key = Vec::new();
            codec::encode_varint(file_id.get(), &mut key);
            Ok(txn.get(TableId::MetaMaps, &key)?.is_some())
        }
        Filter::FileType(mime) => Ok(load_file_row(txn, file_id)?
            .map(|row| &row.mime_type == mime)
            .unwrap_or(false)),
        Filter::LinksTo(target_uri) => {
            let Some(candidate_target) = meta_target_file_id(txn, file_id)? else {
                return Ok(false);
            };
            match resolve_file_id_by_uri(txn, target_uri)? {
                Some(named) => Ok(candidate_target == named),
                None => Ok(false),
            }
        }
        Filter::LinkedFrom(source_uri) => {
            let Some(meta_file_id) = resolve_file_id_by_uri(txn, source_uri)? else {
                return Ok(false);
            };
            match meta_target_file_id(txn, meta_file_id)? {
                Some(target) => Ok(target == file_id),
                None => Ok(false),
            }
        }
        Filter::Badge { field, value } => has_badge(txn, file_id, field, value),
        Filter::ObsoleteMetaFile => {
            let Some(row) = load_file_row(txn, file_id)? else {
                return Ok(false);
            };
            if row.mime_type != crate::metafile::META_FILE_MIME_TYPE {
                return Ok(false);
            }
            let mut key = Vec::new();
            codec::encode_varint(file_id.get(), &mut key);
            Ok(txn.get(TableId::MetaMaps, &key)?.is_none())
        }
        Filter::And(children) => {
            for child in children {
                if !matches(txn, child, file_id)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::Or(children) => {
            for child in children {
                if matches(txn, child, file_id)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Filter::Not(inner) => Ok(!matches(txn, inner, file_id)?),
    }
}

fn has_badge(txn: &dyn KvTransaction, file_id: FileId, field: &str, value: &str) -> SlnResult<bool> {
    let Some(row) = load_file_row(txn, file_id)? else {
        return Ok(false);
    };
    let (kb, _) = crate::codec::KeyBuilder::table(TableId::Tags)
        .u64(row.primary_uri_id)
        .string(Some(field));
    let (kb, _) = kb.string(Some(value));
    let prefix = kb.build();
    let (min, max) = codec::range_for_prefix(&prefix);
    let mut cursor = txn.range(TableId::Tags, &min, &max)?;
    Ok(cursor.next(true).is_some())
}

/// Iterates `(sort-id, file-id)` pairs in `SubmissionSequence` order,
/// yielding only entries that satisfy `filter`.
pub struct FilterCursor<'a> {
    txn: &'a dyn KvTransaction,
    filter: &'a Filter,
    inner: Box<dyn crate::kv::KvCursor>,
}

impl<'a> FilterCursor<'a> {
    pub fn new(
        txn: &'a dyn KvTransaction,
        filter: &'a Filter,
        forward: bool,
        after: Option<SubmissionSequence>,
    ) -> SlnResult<Self> {
        let mut inner = txn.range(TableId::SubmissionSequence, &[], &[0xff; 9])?;
        if let Some(after) = after {
            let mut key = Vec::new();
            codec::encode_varint(after.0, &mut key);
            inner.seek(&key, forward);
        }
        Ok(FilterCursor { txn, filter, inner })
    }

    /// Advances to the next matching entry, or `None` once the
    /// underlying range is exhausted.
    pub fn step(&mut self, forward: bool) -> SlnResult<Option<(SubmissionSequence, FileId)>> {
        while let Some((key, val)) = self.inner.next(forward) {
            let (seq, _) = codec::decode_varint(&key)?;
            let (fid, _) = codec::decode_varint(&val)?;
            let file_id = FileId(fid);
            if matches(self.txn, self.filter, file_id)? {
                return Ok(Some((SubmissionSequence(seq), file_id)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryEnv;
    use crate::kv::KvEnvironment;
    use crate::repo::Repository;
    use crate::session::{Session, SessionCache, SessionMode};
    use crate::submission::Submission;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn repo_with(files: &[(&str, &[u8])]) -> (Arc<Repository>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tmp")).unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        let repo = Repository::in_memory(dir.path().join("tmp"), dir.path().join("data"), dir.path().join("cache"));
        let cache = SessionCache::new();
        let mut session = Session::anonymous(cache.alloc_id(), false);
        session.mode = SessionMode::ReadWrite;

        let mut subs = Vec::new();
        for (mime, body) in files {
            let mut sub = Submission::create(repo.clone(), &session, mime, None).await.unwrap();
            sub.write(body).await.unwrap();
            sub.end().await.unwrap();
            subs.push(sub);
        }
        Submission::store_batch(&repo, subs).await.unwrap();
        (repo, dir)
    }

    #[tokio::test]
    async fn all_filter_yields_every_committed_file_in_order() {
        let (repo, _dir) = repo_with(&[("text/plain", b"a"), ("text/plain", b"b")]).await;
        let txn = repo.env.begin(false).unwrap();
        let mut cur = FilterCursor::new(&*txn, &Filter::All, true, None).unwrap();
        let mut seen = Vec::new();
        while let Some((seq, _)) = cur.step(true).unwrap() {
            seen.push(seq);
        }
        assert_eq!(seen.len(), 2);
        assert!(seen[0] < seen[1]);
    }

    #[tokio::test]
    async fn file_type_filter_excludes_other_types() {
        let (repo, _dir) = repo_with(&[("text/plain", b"a"), ("image/png", b"b")]).await;
        let txn = repo.env.begin(false).unwrap();
        let mut cur = FilterCursor::new(&*txn, &Filter::FileType("image/png".into()), true, None).unwrap();
        let mut count = 0;
        while cur.step(true).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn meta_file_filter_matches_only_meta_files() {
        let (repo, _dir) = repo_with(&[
            (crate::metafile::META_FILE_MIME_TYPE, b"hash://sha256/deadbeef\ntag: x\n"),
            ("text/plain", b"irrelevant"),
        ])
        .await;
        let txn = repo.env.begin(false).unwrap();
        let mut cur = FilterCursor::new(&*txn, &Filter::MetaFile, true, None).unwrap();
        let mut count = 0;
        while cur.step(true).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn not_filter_complements_the_base_set() {
        let (repo, _dir) = repo_with(&[("text/plain", b"a"), ("image/png", b"b")]).await;
        let txn = repo.env.begin(false).unwrap();
        let filter = Filter::not(Filter::FileType("image/png".into()));
        let mut cur = FilterCursor::new(&*txn, &filter, true, None).unwrap();
        let mut count = 0;
        while cur.step(true).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }
}
