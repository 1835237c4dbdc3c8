//! In-memory `KvEnvironment` used by tests and by any embedder that
//! doesn't need durability. Reads see a consistent snapshot taken at
//! `begin()`; writes apply on `commit()`, which matches the "read-only
//! transactions may run concurrently with \[the single\] write
//! transaction" requirement via copy-on-write snapshots.

use super::{KvCursor, KvEnvironment, KvTransaction};
use crate::codec::TableId;
use crate::error::{SlnError, SlnResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

type Key = Vec<u8>;
type Snapshot = Arc<BTreeMap<Key, Vec<u8>>>;

pub struct MemoryEnv {
    snapshot: Arc<Mutex<Snapshot>>,
    write_lock: Arc<Mutex<()>>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        MemoryEnv {
            snapshot: Arc::new(Mutex::new(Arc::new(BTreeMap::new()))),
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl Default for MemoryEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvEnvironment for MemoryEnv {
    fn begin(&self, read_write: bool) -> SlnResult<Box<dyn KvTransaction>> {
        let base = self.snapshot.lock().clone();
        let guard = if read_write {
            Some(self.write_lock.clone().lock_arc())
        } else {
            None
        };
        Ok(Box::new(MemoryTxn {
            snapshot_slot: if read_write {
                Some(self.snapshot.clone())
            } else {
                None
            },
            base,
            pending: Mutex::new(BTreeMap::new()),
            read_write,
            _guard: guard,
        }))
    }
}

enum Pending {
    Put(Vec<u8>),
    Delete,
}

/// Prefixes a raw table-relative key with its table discriminant so all
/// tables share one flat keyspace, same as the real schema's leading
/// table-id varint.
fn full_key(table: TableId, key: &[u8]) -> Key {
    let mut k = Vec::with_capacity(key.len() + 1);
    k.push(table as u8);
    k.extend_from_slice(key);
    k
}

struct MemoryTxn {
    snapshot_slot: Option<Arc<Mutex<Snapshot>>>,
    base: Snapshot,
    pending: Mutex<BTreeMap<Key, Pending>>,
    read_write: bool,
    _guard: Option<parking_lot::lock_api::ArcMutexGuard<parking_lot::RawMutex, ()>>,
}

impl KvTransaction for MemoryTxn {
    fn get(&self, table: TableId, key: &[u8]) -> SlnResult<Option<Vec<u8>>> {
        let fk = full_key(table, key);
        if let Some(p) = self.pending.lock().get(&fk) {
            return Ok(match p {
                Pending::Put(v) => Some(v.clone()),
                Pending::Delete => None,
            });
        }
        Ok(self.base.get(&fk).cloned())
    }

    fn put(&self, table: TableId, key: &[u8], value: &[u8]) -> SlnResult<()> {
        if !self.read_write {
            return Err(SlnError::Einval("write on read-only transaction".into()));
        }
        let fk = full_key(table, key);
        self.pending.lock().insert(fk, Pending::Put(value.to_vec()));
        Ok(())
    }

    fn put_if_absent(&self, table: TableId, key: &[u8], value: &[u8]) -> SlnResult<bool> {
        if self.get(table, key)?.is_some() {
            return Ok(false);
        }
        self.put(table, key, value)?;
        Ok(true)
    }

    fn delete(&self, table: TableId, key: &[u8]) -> SlnResult<()> {
        if !self.read_write {
            return Err(SlnError::Einval("delete on read-only transaction".into()));
        }
        let fk = full_key(table, key);
        self.pending.lock().insert(fk, Pending::Delete);
        Ok(())
    }

    fn range(&self, table: TableId, min: &[u8], max: &[u8]) -> SlnResult<Box<dyn KvCursor>> {
        let fmin = full_key(table, min);
        let fmax = full_key(table, max);
        let mut merged: BTreeMap<Key, Vec<u8>> = self
            .base
            .range(fmin.clone()..fmax.clone())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, p) in self.pending.lock().range(fmin..fmax) {
            match p {
                Pending::Put(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                Pending::Delete => {
                    merged.remove(k);
                }
            }
        }
        // Strip the one-byte table discriminant `full_key` prepended: callers
        // deal in table-relative keys (the same space `min`/`max` were given
        // in), not the flat keyspace this store merges tables into.
        let items: Vec<(Vec<u8>, Vec<u8>)> = merged.into_iter().map(|(k, v)| (k[1..].to_vec(), v)).collect();
        Ok(Box::new(MemoryCursor { items, pos: None }))
    }

    fn commit(self: Box<Self>) -> SlnResult<()> {
        let Some(slot) = self.snapshot_slot else {
            return Ok(());
        };
        let mut next = (*self.base).clone();
        for (k, p) in self.pending.into_inner().into_iter() {
            match p {
                Pending::Put(v) => {
                    next.insert(k, v);
                }
                Pending::Delete => {
                    next.remove(&k);
                }
            }
        }
        *slot.lock() = Arc::new(next);
        Ok(())
    }
}

/// Cursor position as a signed offset so "before the first item" (`-1`)
/// and "past the last item" (`items.len() as isize`) are ordinary values
/// rather than a `usize::MAX` sentinel that plain `+ 1`/`- 1` arithmetic
/// can wrap through.
struct MemoryCursor {
    items: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<isize>,
}

impl KvCursor for MemoryCursor {
    fn next(&mut self, forward: bool) -> Option<(Vec<u8>, Vec<u8>)> {
        if self.items.is_empty() {
            return None;
        }
        let next_pos = match self.pos {
            None => {
                if forward {
                    0
                } else {
                    self.items.len() as isize - 1
                }
            }
            Some(p) => {
                if forward {
                    p + 1
                } else {
                    p - 1
                }
            }
        };
        self.pos = Some(next_pos);
        if next_pos < 0 || next_pos >= self.items.len() as isize {
            return None;
        }
        Some(self.items[next_pos as usize].clone())
    }

    fn seek(&mut self, key: &[u8], forward: bool) {
        let len = self.items.len() as isize;
        self.pos = Some(match self.items.binary_search_by(|(k, _)| k.as_slice().cmp(key)) {
            // Exact match: landing pos is the match itself in both
            // directions, since `next()` steps off of it before
            // returning (`+1` to resume past it ascending, `-1` to
            // resume before it descending).
            Ok(i) => i as isize,
            Err(i) => {
                // `i` is the insertion point: first index with key > target.
                let i = i as isize;
                if forward {
                    i - 1
                } else {
                    i
                }
            }
        }
        .clamp(-1, len));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_in_same_txn() {
        let env = MemoryEnv::new();
        let txn = env.begin(true).unwrap();
        txn.put(TableId::Files, b"k", b"v").unwrap();
        assert_eq!(txn.get(TableId::Files, b"k").unwrap(), Some(b"v".to_vec()));
        txn.commit().unwrap();

        let txn2 = env.begin(false).unwrap();
        assert_eq!(txn2.get(TableId::Files, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn put_if_absent_respects_existing_value() {
        let env = MemoryEnv::new();
        let txn = env.begin(true).unwrap();
        assert!(txn.put_if_absent(TableId::Files, b"k", b"v1").unwrap());
        assert!(!txn.put_if_absent(TableId::Files, b"k", b"v2").unwrap());
        assert_eq!(txn.get(TableId::Files, b"k").unwrap(), Some(b"v1".to_vec()));
        txn.commit().unwrap();
    }

    #[test]
    fn uncommitted_write_is_not_visible_to_other_snapshot() {
        let env = MemoryEnv::new();
        let txn = env.begin(true).unwrap();
        txn.put(TableId::Files, b"k", b"v").unwrap();
        let reader = env.begin(false).unwrap();
        assert_eq!(reader.get(TableId::Files, b"k").unwrap(), None);
        txn.commit().unwrap();
    }

    #[test]
    fn seek_past_the_only_item_does_not_wrap_around() {
        let env = MemoryEnv::new();
        let txn = env.begin(true).unwrap();
        txn.put(TableId::Files, &[5u8], b"x").unwrap();
        txn.commit().unwrap();

        let reader = env.begin(false).unwrap();
        let mut cursor = reader.range(TableId::Files, &[0], &[0xff]).unwrap();
        cursor.seek(&[5u8], true);
        // Resuming forward from the single existing key must exhaust the
        // cursor, not wrap back around to yield it again.
        assert_eq!(cursor.next(true), None);
        assert_eq!(cursor.next(true), None);
    }

    #[test]
    fn range_scan_returns_sorted_keys() {
        let env = MemoryEnv::new();
        let txn = env.begin(true).unwrap();
        for k in [3u8, 1, 2] {
            txn.put(TableId::Files, &[k], b"x").unwrap();
        }
        txn.commit().unwrap();

        let reader = env.begin(false).unwrap();
        let mut cursor = reader.range(TableId::Files, &[0], &[0xff]).unwrap();
        let mut seen = Vec::new();
        while let Some((k, _)) = cursor.next(true) {
            seen.push(k[0]);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
