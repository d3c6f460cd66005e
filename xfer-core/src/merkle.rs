//! Interleaved Merkle engine (C2): builds the clear-hash tree and the
//! cipher-chunk tree in lockstep so that a proof for one leaf yields a
//! proof of identical shape for the corresponding leaf in the other tree
//! (invariant 2 — same chunk count, same pairing order).
//!
//! [`MerkleBuilder`] is the streaming half: it holds only `O(log n)`
//! pending hashes (one per "peak", in the style of a binary counter) and
//! emits the root once the leaf stream closes. [`ProofTree`] is the
//! second-pass half: given all `(index, leaf)` pairs replayed from
//! storage, it materializes the full level structure needed to produce an
//! inclusion [`Proof`] for any single index, per the Design Note in §9
//! ("second pass over the on-disk chunk store for proof generation
//! rather than keeping trees in memory").
//!
//! Internal nodes are hashed with a `0x01` prefix; leaves with a `0x00`
//! prefix plus the varint-encoded chunk index, so the two kinds of node
//! can never collide and a leaf's hash is position-sensitive.
//!
//! Pairing is left-to-right; when a level has an odd number of nodes the
//! last one is promoted unchanged into the next level (a "carry", as in a
//! binary counter) rather than duplicated.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::model::{encode_varint, Hash, Index};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hashes a single Merkle leaf: `SHA256(0x00 || varint(index) || data)`.
pub fn leaf_hash(index: Index, data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(encode_varint(index));
    hasher.update(data);
    finish(hasher)
}

fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    finish(hasher)
}

fn finish(hasher: Sha256) -> Hash {
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Orientation of a sibling hash relative to the node being proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// The sibling is to the left; the node under proof is the right child.
    Left,
    /// The sibling is to the right; the node under proof is the left child.
    Right,
}

/// A single step of a Merkle inclusion proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Hash,
    pub side: Side,
}

/// An inclusion proof for one leaf, ordered leaf-proximal first (innermost
/// first). Rendered into reversed, root-proximal-last order only at the
/// point it is pushed onto a contract program (§6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub leaf_hash: Hash,
    pub steps: Vec<ProofStep>,
}

impl Proof {
    /// Recomputes the root implied by this proof and compares it to `root`.
    pub fn verify(&self, root: &Hash) -> bool {
        let mut acc = self.leaf_hash;
        for step in &self.steps {
            acc = match step.side {
                Side::Left => node_hash(&step.sibling, &acc),
                Side::Right => node_hash(&acc, &step.sibling),
            };
        }
        acc == *root
    }

    /// Renders this proof in the order a contract program expects it
    /// pushed: root-proximal last becomes root-proximal first on the
    /// value stack, i.e. the wire order is the reverse of `steps`.
    pub fn to_wire_order(&self) -> Vec<ProofStep> {
        let mut v = self.steps.clone();
        v.reverse();
        v
    }
}

/// Streaming builder: consumes `(index, leaf)` pairs in strict index
/// order and holds `O(log n)` pending peaks, in the style of a binary
/// counter / Merkle mountain range.
#[derive(Debug, Default)]
pub struct MerkleBuilder {
    peaks: Vec<Option<Hash>>,
    next_index: Index,
    leaf_count: u64,
}

impl MerkleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next leaf's already-hashed value. Must be called in
    /// strictly increasing index order starting at 0 (§5 "Ordering").
    pub fn push(&mut self, index: Index, leaf: Hash) -> Result<()> {
        if index != self.next_index {
            return Err(Error::Other("merkle leaves must be pushed in order"));
        }
        let mut carry = leaf;
        let mut level = 0usize;
        loop {
            if level == self.peaks.len() {
                self.peaks.push(Some(carry));
                break;
            }
            match self.peaks[level].take() {
                None => {
                    self.peaks[level] = Some(carry);
                    break;
                }
                Some(existing) => {
                    carry = node_hash(&existing, &carry);
                    level += 1;
                }
            }
        }
        self.next_index += 1;
        self.leaf_count += 1;
        Ok(())
    }

    /// Bags the remaining peaks, high level (leftmost, earliest leaves)
    /// to low, into the single root hash. Empty input has no defined
    /// root; callers must have pushed at least one leaf.
    pub fn finalize(self) -> Result<Hash> {
        let mut acc: Option<Hash> = None;
        for peak in self.peaks.into_iter().rev().flatten() {
            acc = Some(match acc {
                None => peak,
                Some(a) => node_hash(&a, &peak),
            });
        }
        acc.ok_or(Error::Other("cannot finalize an empty merkle tree"))
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }
}

/// Feeds `(index, clear_hash, cipher_chunk)` triples into two
/// [`MerkleBuilder`]s sharing the same topology, as required by
/// invariant 2.
#[derive(Debug, Default)]
pub struct InterleavedBuilder {
    clear: MerkleBuilder,
    cipher: MerkleBuilder,
}

impl InterleavedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index: Index, clear_hash_bytes: Hash, cipher_chunk: &[u8]) -> Result<()> {
        self.clear.push(index, leaf_hash(index, &clear_hash_bytes))?;
        self.cipher.push(index, leaf_hash(index, cipher_chunk))?;
        Ok(())
    }

    /// Returns `(ClearRoot, CipherRoot)`.
    pub fn finalize(self) -> Result<(Hash, Hash)> {
        let clear_root = self.clear.finalize()?;
        let cipher_root = self.cipher.finalize()?;
        Ok((clear_root, cipher_root))
    }
}

/// Materialized per-level arrays, built from a full replay of leaves, used
/// to generate an inclusion proof for any single index (second pass).
pub struct ProofTree {
    levels: Vec<Vec<Hash>>,
}

impl ProofTree {
    /// Builds the full tree from leaf hashes in index order (already
    /// passed through [`leaf_hash`]).
    pub fn from_leaves(leaves: Vec<Hash>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::Other("cannot build a merkle tree from zero leaves"));
        }
        let mut levels = vec![leaves];
        while levels.last().unwrap().len() > 1 {
            let cur = levels.last().unwrap();
            let mut next = Vec::with_capacity(cur.len().div_ceil(2));
            let mut i = 0;
            while i + 1 < cur.len() {
                next.push(node_hash(&cur[i], &cur[i + 1]));
                i += 2;
            }
            if cur.len() % 2 == 1 {
                next.push(cur[cur.len() - 1]);
            }
            levels.push(next);
        }
        Ok(Self { levels })
    }

    pub fn root(&self) -> Hash {
        self.levels.last().unwrap()[0]
    }

    /// Builds the inclusion proof for leaf `index`.
    pub fn proof_for(&self, index: usize) -> Result<Proof> {
        let leaf = *self
            .levels
            .first()
            .and_then(|l| l.get(index))
            .ok_or(Error::InvalidProof(index as u64))?;
        let mut steps = Vec::new();
        let mut i = index;
        for level in &self.levels[..self.levels.len() - 1] {
            if i % 2 == 1 {
                steps.push(ProofStep {
                    sibling: level[i - 1],
                    side: Side::Left,
                });
            } else if i + 1 < level.len() {
                steps.push(ProofStep {
                    sibling: level[i + 1],
                    side: Side::Right,
                });
            }
            // else: `i` is the odd leftover at this level, carried
            // unchanged — no proof step contributed.
            i /= 2;
        }
        Ok(Proof {
            leaf_hash: leaf,
            steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u64) -> Vec<Hash> {
        (0..n).map(|i| leaf_hash(i, &i.to_le_bytes())).collect()
    }

    #[test]
    fn streaming_and_second_pass_agree_on_root() {
        for n in 1..20u64 {
            let ls = leaves(n);
            let mut builder = MerkleBuilder::new();
            for (i, l) in ls.iter().enumerate() {
                builder.push(i as u64, *l).unwrap();
            }
            let streamed_root = builder.finalize().unwrap();
            let tree = ProofTree::from_leaves(ls).unwrap();
            assert_eq!(streamed_root, tree.root(), "mismatch at n={n}");
        }
    }

    #[test]
    fn proof_verifies_for_every_leaf_and_odd_counts() {
        for n in 1..20u64 {
            let ls = leaves(n);
            let tree = ProofTree::from_leaves(ls).unwrap();
            let root = tree.root();
            for i in 0..n as usize {
                let proof = tree.proof_for(i).unwrap();
                assert!(proof.verify(&root), "proof failed n={n} i={i}");
            }
        }
    }

    #[test]
    fn tampered_proof_fails() {
        let ls = leaves(5);
        let tree = ProofTree::from_leaves(ls).unwrap();
        let root = tree.root();
        let mut proof = tree.proof_for(2).unwrap();
        proof.steps[0].sibling[0] ^= 0xff;
        assert!(!proof.verify(&root));
    }

    #[test]
    fn interleaved_builder_shares_topology() {
        let mut ib = InterleavedBuilder::new();
        let mut clear_leaves = Vec::new();
        let mut cipher_leaves = Vec::new();
        for i in 0..7u64 {
            let ch = crate::chunk::clear_hash(i, &i.to_le_bytes());
            let cipher = vec![i as u8; 4];
            ib.push(i, ch, &cipher).unwrap();
            clear_leaves.push(leaf_hash(i, &ch));
            cipher_leaves.push(leaf_hash(i, &cipher));
        }
        let (clear_root, cipher_root) = ib.finalize().unwrap();
        let clear_tree = ProofTree::from_leaves(clear_leaves).unwrap();
        let cipher_tree = ProofTree::from_leaves(cipher_leaves).unwrap();
        assert_eq!(clear_root, clear_tree.root());
        assert_eq!(cipher_root, cipher_tree.root());
        // same topology: proof for index 3 has the same number of steps
        assert_eq!(
            clear_tree.proof_for(3).unwrap().steps.len(),
            cipher_tree.proof_for(3).unwrap().steps.len()
        );
    }
}
