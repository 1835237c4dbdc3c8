//! The transactional key-value store is an external collaborator (the
//! spec treats it as "an ordered key/value map supporting range cursors
//! and multi-version transactions"). This module defines the seam the
//! rest of the crate programs against, plus an in-memory implementation
//! (`memory::MemoryEnv`) sufficient to exercise the submission and
//! filter pipelines in tests without depending on a real embedded engine.

pub mod memory;

use crate::codec::TableId;
use crate::error::SlnResult;

/// An opened key-value environment. `begin` starts either a read-write
/// transaction (serialized; only one may be open at a time) or a
/// read-only snapshot transaction (may run concurrently with the writer).
pub trait KvEnvironment: Send + Sync {
    fn begin(&self, read_write: bool) -> SlnResult<Box<dyn KvTransaction>>;
}

/// A single transaction. Must end in exactly one of `commit` or a drop
/// (which aborts any uncommitted writes).
pub trait KvTransaction {
    fn get(&self, table: TableId, key: &[u8]) -> SlnResult<Option<Vec<u8>>>;
    fn put(&self, table: TableId, key: &[u8], value: &[u8]) -> SlnResult<()>;
    fn put_if_absent(&self, table: TableId, key: &[u8], value: &[u8]) -> SlnResult<bool>;
    fn delete(&self, table: TableId, key: &[u8]) -> SlnResult<()>;

    /// Inclusive-min / exclusive-max range cursor within `table`, ordered
    /// by `min`/`max` as raw byte ranges (post table-id prefix).
    fn range(
        &self,
        table: TableId,
        min: &[u8],
        max: &[u8],
    ) -> SlnResult<Box<dyn KvCursor>>;

    fn commit(self: Box<Self>) -> SlnResult<()>;
}

/// A forward/backward cursor over `(key, value)` pairs within a range.
pub trait KvCursor {
    /// Advances the cursor and returns the next pair, or `None` when the
    /// range is exhausted. `forward` selects iteration direction.
    fn next(&mut self, forward: bool) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Repositions the cursor to the first key `>=` (or, going backward,
    /// `<=`) `key` within the original range.
    fn seek(&mut self, key: &[u8], forward: bool);
}
