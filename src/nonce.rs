//! Process-unique nonce generation for temp file names, cookie secrets,
//! and password salts. The teacher depends on neither `rand` nor any
//! other RNG crate, so rather than add one (see DESIGN.md), nonces are
//! derived from a monotonic counter mixed with wall-clock time and the
//! process id — unique and unguessable enough for naming temp files and
//! cookie secrets, never used as a cryptographic key on its own.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn seed() -> [u8; 32] {
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(count.to_le_bytes());
    hasher.update(now.as_nanos().to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.finalize().into()
}

/// Returns `n` pseudo-random bytes. `n` may exceed 32; additional blocks
/// are derived by re-hashing the previous block.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(n);
    let mut block = seed();
    while out.len() < n {
        out.extend_from_slice(&block);
        block = Sha256::digest(block).into();
    }
    out.truncate(n);
    out
}

/// A lowercase-hex token suitable for cookie secrets and temp file names.
pub fn random_token(byte_len: usize) -> String {
    hex::encode(random_bytes(byte_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successive_tokens_differ() {
        let a = random_token(16);
        let b = random_token(16);
        assert_ne!(a, b);
    }

    #[test]
    fn random_bytes_honors_length() {
        assert_eq!(random_bytes(5).len(), 5);
        assert_eq!(random_bytes(64).len(), 64);
    }
}
