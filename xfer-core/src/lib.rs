//! xfer-core — the fair-exchange content delivery protocol engine.
//!
//! This crate is the "core" referred to by the rest of the workspace: the
//! construction and parsing of the ledger contract that escrows funds
//! ([`contract`]), the chunked-encryption + interleaved-Merkle-tree
//! scheme that binds ciphertext to plaintext commitments ([`chunk`],
//! [`merkle`]), the deadline-driven state machine run by each party
//! ([`state_machine`]), and the streaming pipeline that ties chunk I/O to
//! the Merkle builder ([`pipeline`]).
//!
//! HTTP transport, the ledger client, key file I/O, and CLI parsing are
//! adapters that live in sibling crates; this crate stays free of network
//! I/O, touching the filesystem only through the [`store::ChunkStore`]
//! trait it defines.

pub mod anchor;
pub mod chunk;
pub mod config;
pub mod contract;
pub mod error;
pub mod merkle;
pub mod model;
pub mod pipeline;
pub mod state_machine;
pub mod store;

pub use error::{Error, Result};
pub use model::{
    Amount, Anchor, AssetId, Hash, Index, Key, LedgerTime, PubKeyBytes, TransferId, TransferParams,
};
