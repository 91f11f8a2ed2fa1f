//! Merkle commitment over ordered link lists.
//!
//! This is the fingerprint function used to content-address micro-batches and
//! to aggregate finalized spans for anchoring payloads. It's a plain binary
//! tree with domain-separated leaf/internal hashing; an unpaired node at the
//! end of a level is promoted to the next level unchanged.

use crate::{hash, Buf32};

/// Domain tag for leaf hashes.
const LEAF_TAG: u8 = 0x00;

/// Domain tag for internal node hashes.
const NODE_TAG: u8 = 0x01;

/// Computes the commitment over an ordered list of links.
///
/// Deterministic and order-sensitive: permuting the links changes the root.
/// The empty list commits to the bare leaf-domain hash so the function is
/// total.
pub fn commit_links<S: AsRef<[u8]>>(links: &[S]) -> Buf32 {
    let leaves: Vec<Buf32> = links
        .iter()
        .map(|l| hash::tagged(LEAF_TAG, &[l.as_ref()]))
        .collect();
    fold_root(leaves)
}

/// Computes an aggregate commitment over already-computed fingerprints, the
/// "merkle of merkles" handed to ledger submission.
pub fn commit_fingerprints(fingerprints: &[Buf32]) -> Buf32 {
    let leaves: Vec<Buf32> = fingerprints
        .iter()
        .map(|fp| hash::tagged(LEAF_TAG, &[fp.as_slice()]))
        .collect();
    fold_root(leaves)
}

fn fold_root(mut level: Vec<Buf32>) -> Buf32 {
    if level.is_empty() {
        return hash::tagged(LEAF_TAG, &[]);
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut iter = level.chunks_exact(2);
        for pair in &mut iter {
            next.push(hash::tagged(
                NODE_TAG,
                &[pair[0].as_slice(), pair[1].as_slice()],
            ));
        }
        // Odd node gets promoted as-is.
        if let [last] = iter.remainder() {
            next.push(*last);
        }
        level = next;
    }

    level[0]
}
