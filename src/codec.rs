//! Bijective serialization for composite keys and values: varints,
//! inline-or-hashed strings, and typed key construction.
//!
//! Ported 1:1 from the semantics in `db_schema.c` (`varint_encode`,
//! `varint_decode`, `db_bind_string_len`, `db_read_string`,
//! `db_range_genmax`) in the original C implementation.

use crate::error::{SlnError, SlnResult};
use crate::kv::KvTransaction;
use sha2::{Digest, Sha256};

/// Inline strings (including their terminator) fit in this many bytes
/// before the codec switches to prefix + hash.
pub const INLINE_MAX: usize = 96;
/// Truncation boundary: `INLINE_MAX` minus the 32-byte SHA-256 digest.
pub const INLINE_TRUNC: usize = INLINE_MAX - 32;

/// Stable, on-disk table identifiers. Never renumber an existing variant;
/// the discriminant is part of the persisted key format.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum TableId {
    Files = 0,
    Uris = 1,
    FileUris = 2,
    UrisByFile = 3,
    Users = 4,
    Sessions = 5,
    Tags = 6,
    TagsByTarget = 7,
    SubmissionSequence = 8,
    SubmittedFiles = 9,
    MetaMaps = 10,
    StringTable = 11,
}

// ---------------------------------------------------------------------
// Varint
// ---------------------------------------------------------------------

/// Appends the 1-9 byte self-delimiting big-endian encoding of `x`.
/// The top nibble of the first byte holds `len - 1`; the bottom nibble
/// plus any continuation bytes hold the value, most significant first.
pub fn encode_varint(x: u64, out: &mut Vec<u8>) {
    let mut rem: i32 = 8;
    let mut buf = [0u8; 9];
    let mut len = 0usize;
    while rem > 0 {
        rem -= 1;
        let y = ((x >> (8 * rem)) & 0xff) as u8;
        if len > 0 {
            buf[len] = y;
            len += 1;
        } else if y != 0 && y <= 0x0f {
            buf[len] = ((rem as u8) << 4) | (y & 0x0f);
            len += 1;
        } else if y != 0 {
            buf[len] = ((rem as u8 + 1) << 4) | 0;
            len += 1;
            buf[len] = y;
            len += 1;
        }
    }
    if len == 0 {
        buf[0] = 0;
        len = 1;
    }
    out.extend_from_slice(&buf[..len]);
    debug_assert_eq!(decode_varint(&buf[..len]).map(|(v, _)| v), Ok(x));
}

/// Recovers the length (1-9) of the varint at the start of `data` from its
/// first byte alone.
pub fn varint_len(first_byte: u8) -> usize {
    (first_byte >> 4) as usize + 1
}

/// Decodes a single varint from the start of `data`, returning the value
/// and the number of bytes consumed. Total on well-formed input; returns
/// `Einval` rather than panicking on truncated or adversarial input.
pub fn decode_varint(data: &[u8]) -> SlnResult<(u64, usize)> {
    if data.is_empty() {
        return Err(SlnError::Einval("empty varint".into()));
    }
    let len = varint_len(data[0]);
    if len == 0 || data.len() < len {
        return Err(SlnError::Einval("truncated varint".into()));
    }
    let mut x: u64 = (data[0] & 0x0f) as u64;
    for &b in &data[1..len] {
        x = (x << 8) | b as u64;
    }
    Ok((x, len))
}

// ---------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------

/// Encodes `s` (`None` for SQL-NULL-like absence) into `out` using the
/// inline-or-hashed scheme. When the string is longer than the inline
/// budget, also returns the `(key, full_bytes)` pair to intern via
/// `StringInterner` — the caller decides whether/when to write it (the
/// side table is append-only and keyed by `inline_prefix || hash`).
pub fn encode_string(s: Option<&str>, out: &mut Vec<u8>) -> Option<(Vec<u8>, Vec<u8>)> {
    let s = match s {
        None => {
            out.push(0x00);
            out.push(0x00);
            return None;
        }
        Some(s) => s,
    };
    if s.is_empty() {
        out.push(0x00);
        out.push(0x01);
        return None;
    }
    let bytes = s.as_bytes();
    if bytes.len() < INLINE_TRUNC {
        out.extend_from_slice(bytes);
        out.push(0x00);
        if bytes.len() + 1 == INLINE_TRUNC {
            // Ambiguous with a truncated encoding unless disambiguated.
            out.push(0x00);
        }
        return None;
    }

    let prefix_len = INLINE_TRUNC - 1;
    let key_start = out.len();
    out.extend_from_slice(&bytes[..prefix_len]);
    out.push(0x00);

    let mut hash = Sha256::new();
    hash.update(bytes);
    let mut digest = hash.finalize();
    if digest[0] == 0x00 {
        digest[0] = 0x01;
    }
    out.extend_from_slice(&digest);

    let key = out[key_start..].to_vec();
    Some((key, bytes.to_vec()))
}

/// Reads a string previously written by `encode_string` from the front of
/// `val`, advancing it past the bytes consumed. Resolves hashed strings
/// through a single `StringInterner` lookup.
pub fn read_string(txn: &dyn KvTransaction, val: &mut &[u8]) -> SlnResult<Option<String>> {
    if val.is_empty() {
        return Err(SlnError::Einval("empty string encoding".into()));
    }
    let scan_len = val.len().min(INLINE_MAX);
    let len = val[..scan_len].iter().position(|&b| b == 0).ok_or_else(|| {
        SlnError::Einval("string encoding missing terminator".into())
    })?;

    if len == 0 {
        if val.len() < 2 {
            return Err(SlnError::Einval("truncated null/empty string marker".into()));
        }
        let marker = val[1];
        *val = &val[2..];
        return match marker {
            0x00 => Ok(None),
            0x01 => Ok(Some(String::new())),
            _ => Err(SlnError::Einval(format!("invalid string marker {marker:#x}"))),
        };
    }

    if len + 1 != INLINE_TRUNC {
        let s = String::from_utf8_lossy(&val[..len]).into_owned();
        *val = &val[len + 1..];
        return Ok(Some(s));
    }

    // Exactly at the truncation boundary: either a genuine short string
    // with the disambiguating sentinel, or a hashed long string.
    if val.len() < len + 2 {
        return Err(SlnError::Einval("truncated string encoding".into()));
    }
    if val[len + 1] == 0x00 {
        let s = String::from_utf8_lossy(&val[..len]).into_owned();
        *val = &val[len + 2..];
        return Ok(Some(s));
    }

    if val.len() < INLINE_MAX {
        return Err(SlnError::Einval("truncated hashed string key".into()));
    }
    let key = val[..INLINE_MAX].to_vec();
    *val = &val[INLINE_MAX..];
    let full = txn
        .get(TableId::StringTable, &key)?
        .ok_or_else(|| SlnError::Panic("string interning side table missing entry".into()))?;
    Ok(Some(String::from_utf8_lossy(&full).into_owned()))
}

// ---------------------------------------------------------------------
// Key builder
// ---------------------------------------------------------------------

/// Builds composite keys: a leading table-id varint followed by the
/// declared columns in order.
#[derive(Default, Clone)]
pub struct KeyBuilder {
    bytes: Vec<u8>,
}

impl KeyBuilder {
    pub fn table(table: TableId) -> Self {
        let mut b = KeyBuilder::default();
        encode_varint(table as u64, &mut b.bytes);
        b
    }

    pub fn u64(mut self, col: u64) -> Self {
        encode_varint(col, &mut self.bytes);
        self
    }

    /// Appends a string column, interning the full value if it was too
    /// long to store inline. Returns the builder plus the intern entry
    /// (if any) for the caller to write into the string table.
    pub fn string(mut self, s: Option<&str>) -> (Self, Option<(Vec<u8>, Vec<u8>)>) {
        let entry = encode_string(s, &mut self.bytes);
        (self, entry)
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// Builds the half-open `[min, max)` range covering every key with `min`
/// as a prefix, by incrementing `min`'s last byte with carry.
pub fn range_for_prefix(min: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut max = min.to_vec();
    let mut i = max.len();
    loop {
        if i == 0 {
            // All 0xff: there is no successor: the range is unbounded above.
            return (min.to_vec(), vec![0xff; min.len() + 1]);
        }
        i -= 1;
        if max[i] < 0xff {
            max[i] += 1;
            max.truncate(i + 1);
            return (min.to_vec(), max);
        }
    }
}
