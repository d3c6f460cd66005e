//! Error taxonomy for the ledger client and observer, in the same flat
//! `thiserror` style as [`xfer_core::error::Error`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger rejected submission: {0}")]
    SubmissionRejected(String),

    #[error("cursor store error: {0}")]
    Cursor(#[from] sled::Error),

    #[error("core protocol error: {0}")]
    Core(#[from] xfer_core::Error),

    #[error("observer watch {0} not found")]
    UnknownWatch(u64),
}

pub type Result<T> = core::result::Result<T, LedgerError>;
