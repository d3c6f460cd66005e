//! Wallet-local error taxonomy, in the same flat `thiserror` style as
//! [`xfer_core::error::Error`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("key file at {path} is {len} bytes, expected 64")]
    BadKeyFileLength { path: String, len: usize },

    #[error("key file {path} could not be read: {source}")]
    KeyFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("key material did not parse as an ed25519 keypair")]
    MalformedKey,

    #[error("funds source holds {have} of asset, {need} required")]
    InsufficientFunds { need: u64, have: u64 },

    #[error("reservation {0} is already resolved")]
    AlreadyResolved(u64),

    #[error("no such reservation: {0}")]
    UnknownReservation(u64),
}

pub type Result<T> = core::result::Result<T, WalletError>;
