//! Streams query results as chunked `text/uri-list` bodies, with an
//! optional tail mode that long-polls for newly committed submissions.
//! Grounded in `SLNServer.c`'s query-response writer: fixed-size
//! batches, one URI per line, a 30-second idle keepalive while tailing.

use crate::codec::decode_varint;
use crate::error::SlnResult;
use crate::filter::{Filter, FilterCursor};
use crate::ids::SubmissionSequence;
use crate::repo::Repository;
use crate::submission::load_file_row;
use std::sync::Arc;
use std::time::Duration;

/// Files resolved per streamed batch before a chunk is flushed.
pub const QUERY_BATCH_SIZE: usize = 50;

/// How long a tail-mode request waits for a new submission before
/// sending an empty keepalive chunk.
pub const TAIL_KEEPALIVE: Duration = Duration::from_secs(30);

pub struct QueryStreamer {
    repo: Arc<Repository>,
    filter: Filter,
    forward: bool,
    after: Option<SubmissionSequence>,
    tail: bool,
    batch_size: usize,
}

impl QueryStreamer {
    pub fn new(repo: Arc<Repository>, filter: Filter, forward: bool, after: Option<SubmissionSequence>, tail: bool) -> Self {
        QueryStreamer { repo, filter, forward, after, tail, batch_size: QUERY_BATCH_SIZE }
    }

    /// Overrides the per-chunk batch size (the `count=` query parameter,
    /// `spec.md` §8 scenario 4). Defaults to `QUERY_BATCH_SIZE`.
    pub fn with_batch_size(mut self, count: usize) -> Self {
        if count > 0 {
            self.batch_size = count;
        }
        self
    }

    /// Produces the next `text/uri-list` chunk. Returns `Ok(None)` once
    /// the filter is exhausted and the stream isn't tailing. In tail
    /// mode, never returns `None`: an exhausted scan instead waits for
    /// `Repository::notify` (or the keepalive timeout) and rescans,
    /// returning an empty chunk on timeout so the connection stays open.
    pub async fn next_chunk(&mut self) -> SlnResult<Option<String>> {
        loop {
            let (lines, last_seen) = self.scan_batch()?;
            if let Some(seen) = last_seen {
                self.after = Some(seen);
            }
            if !lines.is_empty() {
                return Ok(Some(render_uri_list(&lines)));
            }
            if !self.tail {
                return Ok(None);
            }
            let notified = self.repo.notify.notified();
            if tokio::time::timeout(TAIL_KEEPALIVE, notified).await.is_err() {
                return Ok(Some(String::new()));
            }
        }
    }

    fn scan_batch(&self) -> SlnResult<(Vec<String>, Option<SubmissionSequence>)> {
        let txn = self.repo.env.begin(false)?;
        let mut cursor = FilterCursor::new(&*txn, &self.filter, self.forward, self.after)?;
        let mut uris = Vec::new();
        let mut last = None;
        while uris.len() < self.batch_size {
            match cursor.step(self.forward)? {
                Some((seq, file_id)) => {
                    last = Some(seq);
                    if let Some(row) = load_file_row(&*txn, file_id)? {
                        uris.push(row.primary_uri);
                    }
                }
                None => break,
            }
        }
        Ok((uris, last))
    }
}

/// Renders `text/uri-list` lines with the CRLF terminators the format
/// specifies (`spec.md` §8 scenario 3 asserts the literal `\r\n`).
fn render_uri_list(uris: &[String]) -> String {
    let mut out = String::new();
    for uri in uris {
        out.push_str(uri);
        out.push_str("\r\n");
    }
    out
}

/// Parses the `after=<sort-id>` query parameter used to resume a
/// paginated (non-tailing) scan.
pub fn parse_after(raw: &str) -> SlnResult<SubmissionSequence> {
    let bytes = hex::decode(raw).map_err(|_| crate::error::SlnError::Einval("malformed `after` cursor".into()))?;
    let (id, _) = decode_varint(&bytes)?;
    Ok(SubmissionSequence(id))
}

pub fn render_after(seq: SubmissionSequence) -> String {
    let mut buf = Vec::new();
    crate::codec::encode_varint(seq.0, &mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionCache, SessionMode};
    use crate::submission::Submission;
    use tempfile::tempdir;

    async fn repo_with(n: usize) -> (Arc<Repository>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tmp")).unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        let repo = Repository::in_memory(dir.path().join("tmp"), dir.path().join("data"), dir.path().join("cache"));
        let cache = SessionCache::new();
        let mut session = Session::anonymous(cache.alloc_id(), false);
        session.mode = SessionMode::ReadWrite;

        let mut subs = Vec::new();
        for i in 0..n {
            let mut sub = Submission::create(repo.clone(), &session, "text/plain", None).await.unwrap();
            sub.write(format!("file {i}").as_bytes()).await.unwrap();
            sub.end().await.unwrap();
            subs.push(sub);
        }
        Submission::store_batch(&repo, subs).await.unwrap();
        (repo, dir)
    }

    #[tokio::test]
    async fn non_tailing_stream_ends_when_exhausted() {
        let (repo, _dir) = repo_with(3).await;
        let mut streamer = QueryStreamer::new(repo, Filter::All, true, None, false);
        let chunk = streamer.next_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.lines().count(), 3);
        assert!(streamer.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn after_cursor_resumes_without_duplicates() {
        let (repo, _dir) = repo_with(5).await;
        let mut first = QueryStreamer::new(repo.clone(), Filter::All, true, None, false);
        let first_chunk = first.next_chunk().await.unwrap().unwrap();
        let first_lines: Vec<_> = first_chunk.lines().collect();
        assert_eq!(first_lines.len(), 5);

        // Resuming right after the last seen cursor yields nothing new.
        let mut second = QueryStreamer::new(repo, Filter::All, true, first.after, false);
        assert!(second.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn render_and_parse_after_roundtrip() {
        let seq = SubmissionSequence(12345);
        let rendered = render_after(seq);
        assert_eq!(parse_after(&rendered).unwrap(), seq);
    }
}
