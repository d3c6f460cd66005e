//! xfer-wallet — buyer/seller-side key material and funds management.
//!
//! This crate owns the two "external collaborator" concerns the core
//! engine's docs call out as out of scope: key file I/O ([`keyfile`]) and
//! the funds source a transfer draws its reservation from ([`funds`]).

pub mod error;
pub mod funds;
pub mod keyfile;

pub use error::{Result, WalletError};
pub use funds::{FundsSource, InMemoryFundsSource, ReservationHandle};
pub use keyfile::{read_key_file, write_key_file};

use rand::rngs::OsRng;

/// Generates a fresh ed25519 keypair, for `xfer-cli key-gen`.
pub fn generate_keypair() -> ed25519_dalek::Keypair {
    ed25519_dalek::Keypair::generate(&mut OsRng)
}
