//! Error types for the **xfer-core** crate.
//!
//! All high-level operations return [`crate::Result`] which is a convenient
//! alias for `core::result::Result<T, Error>`.
//!
//! The enum follows the protocol's taxonomy of failure kinds (config,
//! transport, protocol, commitment-hazard, fraud, deadline, ledger); only
//! the kinds that can originate inside this crate are represented here.
//! Transport- and ledger-specific errors live in their own crates and are
//! folded into one of these variants at the boundary.
//!
//! # Examples
//!
//! ```
//! use xfer_core::{Error, Result};
//!
//! fn demo_fn(fail: bool) -> Result<()> {
//!     if fail {
//!         Err(Error::MissingContractEntry)
//!     } else {
//!         Ok(())
//!     }
//! }
//! ```

use thiserror::Error;

use crate::model::Index;

/// Core crate error type.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    /// A chunk's plaintext hash did not match the committed clear hash once
    /// decrypted with the revealed key. Triggers the refund path.
    #[error("bad clear hash at chunk {0}")]
    BadClearHash(Index),

    /// The clear root computed while streaming did not match the root the
    /// buyer requested. The transfer is aborted before any funds commit.
    #[error("clear root mismatch: expected {expected}, computed {computed}")]
    ClearRootMismatch { expected: String, computed: String },

    /// A chunk stream record was truncated before its declared length.
    #[error("truncated chunk record at index {0}")]
    TruncatedRecord(Index),

    /// `parse_log` did not find the escrow contract marker in the log.
    #[error("log does not contain an escrow contract entry")]
    MissingContractEntry,

    /// A parameter recovered from the counterparty's log did not match what
    /// was expected when validating a proposal or reveal.
    #[error("parameter mismatch in {field}: expected {expected}, got {got}")]
    ParameterMismatch {
        field: &'static str,
        expected: String,
        got: String,
    },

    /// A Merkle proof did not verify against the committed root.
    #[error("invalid merkle proof for index {0}")]
    InvalidProof(Index),

    /// The funds reservation could not cover the requested amount.
    #[error("insufficient funds: need {need}, have {have}")]
    InsufficientFunds { need: u64, have: u64 },

    /// A reservation was committed or cancelled more than once.
    #[error("reservation already resolved")]
    ReservationAlreadyResolved,

    /// A deadline elapsed before the required action was taken.
    #[error("deadline expired: {0}")]
    DeadlineExpired(&'static str),

    /// Catch-all for invariant violations not covered above.
    #[error("{0}")]
    Other(&'static str),

    /// I/O failure against a chunk store or key file (surfaces as
    /// `TransportError` per §7).
    #[error("{0}")]
    Io(String),
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
