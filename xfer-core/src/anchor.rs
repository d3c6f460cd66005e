//! Deterministic anchor derivation (Design Note in §9): the routine that
//! turns a sequence of input anchors into the merged/split anchor of a new
//! value instance, shared verbatim by the contract builder ([`crate::contract`])
//! and the (simulated) on-chain signature-program predicate that verifies
//! it. Keeping exactly one copy of this routine is what lets the builder
//! and the verifier agree on `Anchor2` without re-deriving it twice in
//! two different ways.

use sha2::{Digest, Sha256};

use crate::model::Anchor;

const MERGE_TAG: &[u8] = b"xfer/anchor/merge";
const SPLIT_TAG: &[u8] = b"xfer/anchor/split";

/// Derives the anchor of a value produced by merging `inputs` (in the
/// order they are consumed by a transaction).
pub fn merge(inputs: &[Anchor]) -> Anchor {
    let mut hasher = Sha256::new();
    hasher.update(MERGE_TAG);
    hasher.update((inputs.len() as u64).to_le_bytes());
    for a in inputs {
        hasher.update(a);
    }
    finish(hasher)
}

/// Derives the anchor of the `index`-th output produced by splitting a
/// single merged anchor into `output_count` outputs (e.g. payment +
/// change).
pub fn split(merged: &Anchor, index: u32, output_count: u32) -> Anchor {
    let mut hasher = Sha256::new();
    hasher.update(SPLIT_TAG);
    hasher.update(merged);
    hasher.update(index.to_le_bytes());
    hasher.update(output_count.to_le_bytes());
    finish(hasher)
}

/// Convenience wrapper: derives the anchor of a transaction's single
/// payment output when the only other output is a change output carrying
/// the remainder, i.e. `split(merge(inputs), 0, 2)`.
pub fn derive_payment_anchor(inputs: &[Anchor]) -> Anchor {
    split(&merge(inputs), 0, 2)
}

/// Derives the change output's anchor for the same merge, i.e.
/// `split(merge(inputs), 1, 2)`. Used by the propose-payment signature
/// program to verify a tamper-proof change output id (scenario 6 in §8).
pub fn derive_change_anchor(inputs: &[Anchor]) -> Anchor {
    split(&merge(inputs), 1, 2)
}

fn finish(hasher: Sha256) -> Anchor {
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
