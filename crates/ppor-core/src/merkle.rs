//! Merkle commitments over captured evidence streams.
//!
//! Each leaf (a video luma frame, reduced IMU trace, or reduced audio trace)
//! is hashed individually, then pairs are folded bottom-up with
//! `sha256(left || right)`. An odd node at any level is paired with itself
//! rather than dropped, so every leaf influences the root. Order sensitivity
//! is the point: reordering or dropping frames changes the root.

use crate::crypto::sha256;
use crate::{Digest32, PporError, Result};
use sha2::{Digest, Sha256};

fn hash_pair(left: &Digest32, right: &Digest32) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(left.0);
    hasher.update(right.0);
    Digest32(hasher.finalize().into())
}

/// Fold an ordered list of byte buffers into a single 32-byte root.
///
/// Fails only on an empty leaf list, which is a caller error.
pub fn merkle_root<L: AsRef<[u8]>>(leaves: &[L]) -> Result<Digest32> {
    if leaves.is_empty() {
        return Err(PporError::InvalidInput("merkle root of zero leaves".into()));
    }

    let mut level: Vec<Digest32> = leaves.iter().map(|l| sha256(l.as_ref())).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left); // duplicate-last rule
            next.push(hash_pair(left, right));
        }
        level = next;
    }
    Ok(level[0])
}
