//! Transport-local error taxonomy, in the same flat `thiserror` style as
//! [`xfer_core::error::Error`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed chunk frame: {0}")]
    MalformedFrame(&'static str),

    #[error("request rejected by seller: {status}: {body}")]
    NonSuccessStatus { status: u16, body: String },

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("core protocol error: {0}")]
    Core(#[from] xfer_core::Error),

    #[error("missing or malformed {0} header")]
    MissingHeader(&'static str),
}

pub type Result<T> = core::result::Result<T, TransportError>;
