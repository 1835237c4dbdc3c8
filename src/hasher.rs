//! Streaming multi-digest hasher. Accepts writes of any size and never
//! buffers content: memory use is O(1) regardless of submission size.
//! Grounded in the single-pass write-and-hash pattern used throughout
//! `examples/other_examples/00406f19_..._content_hasher.rs` and
//! `examples/other_examples/332d1d7a_..._hash-mod.rs`.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// The content URI produced for one digest algorithm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uri(pub String);

impl Uri {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Output of a finished `Hasher`: an ordered URI list (primary first) plus
/// the canonical internal hash used for the on-disk path.
#[derive(Clone, Debug)]
pub struct HashOutput {
    pub uris: Vec<Uri>,
    pub internal_hash_hex: String,
}

impl HashOutput {
    pub fn primary(&self) -> &Uri {
        &self.uris[0]
    }
}

pub struct Hasher {
    sha256: Sha256,
    sha1: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Hasher {
            sha256: Sha256::new(),
            sha1: Sha1::new(),
        }
    }

    /// Feeds `bytes` into every tracked digest. Safe to call any number
    /// of times with arbitrarily small or large chunks.
    pub fn write(&mut self, bytes: &[u8]) {
        self.sha256.update(bytes);
        self.sha1.update(bytes);
    }

    /// Finalizes all digests. SHA-256 is always `uris[0]` (the primary,
    /// canonical URI and the source of the internal on-disk hash);
    /// SHA-1 is emitted after it for cross-algorithm lookups.
    pub fn finish(self) -> HashOutput {
        let sha256_hex = hex::encode(self.sha256.finalize());
        let sha1_hex = hex::encode(self.sha1.finalize());
        HashOutput {
            uris: vec![
                Uri(format!("hash://sha256/{sha256_hex}")),
                Uri(format!("hash://sha1/{sha1_hex}")),
            ],
            internal_hash_hex: sha256_hex,
        }
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `hash://<algo>/<hex>` into its components, as used by the
/// `GET /sln/file/<algo>/<hash>` route.
pub fn parse_hash_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("hash://")?;
    let (algo, hash) = rest.split_once('/')?;
    if algo.is_empty() || hash.is_empty() {
        return None;
    }
    Some((algo, hash))
}

pub fn hash_uri(algo: &str, hex_digest: &str) -> String {
    format!("hash://{algo}/{hex_digest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_hashes_to_known_sha256() {
        let hasher = Hasher::new();
        let out = hasher.finish();
        assert_eq!(
            out.internal_hash_hex,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hello_matches_known_digest() {
        let mut hasher = Hasher::new();
        hasher.write(b"hello\n");
        let out = hasher.finish();
        assert_eq!(
            out.primary().as_str(),
            "hash://sha256/5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn incremental_writes_match_single_write() {
        let mut a = Hasher::new();
        a.write(b"hello\n");
        let mut b = Hasher::new();
        b.write(b"hel");
        b.write(b"lo\n");
        assert_eq!(a.finish().internal_hash_hex, b.finish().internal_hash_hex);
    }

    #[test]
    fn parse_hash_uri_roundtrip() {
        let (algo, hash) = parse_hash_uri("hash://sha256/abcd").unwrap();
        assert_eq!(algo, "sha256");
        assert_eq!(hash, "abcd");
        assert_eq!(hash_uri(algo, hash), "hash://sha256/abcd");
    }

    #[test]
    fn parse_hash_uri_rejects_malformed() {
        assert!(parse_hash_uri("notauri").is_none());
        assert!(parse_hash_uri("hash://sha256/").is_none());
    }
}
