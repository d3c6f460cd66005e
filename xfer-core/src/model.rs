//! Core data model shared by every component: the transfer parameters of
//! §3, the chunk index type, and the unsigned-varint encoding used to
//! domain-separate chunk indices in hash and Merkle-leaf inputs.
//!
//! Glossary
//! --------
//! * **Anchor** – 32-byte value identifying a value instance on the ledger;
//!   changes under merge/split by a specified hash (see [`crate::anchor`]).
//! * **ClearRoot / CipherRoot** – Merkle roots over per-chunk clear hashes
//!   and ciphertexts respectively (see [`crate::merkle`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte hash, used for Merkle roots, leaves, and clear-hashes.
pub type Hash = [u8; 32];

/// A 32-byte value identifying a ledger value instance before/after a
/// merge or split (see invariant 4 in §3).
pub type Anchor = [u8; 32];

/// A 32-byte fungible asset identifier.
pub type AssetId = [u8; 32];

/// Payment or collateral amount, in the smallest unit of `AssetId`.
pub type Amount = u64;

/// Ledger time in unsigned milliseconds since epoch (§6 "Time units").
pub type LedgerTime = u64;

/// Zero-based chunk index.
pub type Index = u64;

/// The 32-byte symmetric transfer key, known only to the seller until reveal.
pub type Key = [u8; 32];

/// 32-byte Ed25519 public key bytes, used for `Buyer`/`Seller` identities.
pub type PubKeyBytes = [u8; 32];

/// Immutable parameters of a transfer, fixed once the request begins (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub clear_root: Hash,
    pub cipher_root: Hash,
    pub amount: Amount,
    pub asset_id: AssetId,
    pub reveal_deadline: LedgerTime,
    pub refund_deadline: LedgerTime,
    pub buyer: PubKeyBytes,
    pub seller: PubKeyBytes,
    pub anchor1: Anchor,
}

/// A transfer is uniquely identified by `(ClearRoot, Anchor1)` (invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId {
    pub clear_root: Hash,
    pub anchor1: Anchor,
}

impl TransferId {
    pub fn new(clear_root: Hash, anchor1: Anchor) -> Self {
        Self { clear_root, anchor1 }
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            hex::encode(&self.clear_root[..8]),
            hex::encode(&self.anchor1[..8])
        )
    }
}

/// Encodes `value` as an unsigned LEB128 varint (invariant 1: a chunk
/// index always uses this same encoding in hash input, Merkle leaf
/// input, and contract input).
pub fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        } else {
            out.push(byte | 0x80);
        }
    }
    out
}

/// Decodes an unsigned LEB128 varint from the front of `bytes`, returning
/// the value and the number of bytes consumed.
pub fn decode_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn varint_known_values() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(127), vec![0x7f]);
        assert_eq!(encode_varint(128), vec![0x80, 0x01]);
        assert_eq!(encode_varint(300), vec![0xac, 0x02]);
    }

    proptest! {
        #[test]
        fn varint_round_trips(v in any::<u64>()) {
            let encoded = encode_varint(v);
            let (decoded, consumed) = decode_varint(&encoded).unwrap();
            prop_assert_eq!(decoded, v);
            prop_assert_eq!(consumed, encoded.len());
        }
    }
}
