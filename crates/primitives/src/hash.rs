//! SHA-256 hashing helpers.

use sha2::{Digest, Sha256};

use crate::Buf32;

/// SHA-256 over a domain tag byte followed by the given parts.
pub fn tagged(tag: u8, parts: &[&[u8]]) -> Buf32 {
    let mut hasher = Sha256::new();
    hasher.update([tag]);
    for part in parts {
        hasher.update(part);
    }
    Buf32::new(hasher.finalize().into())
}
