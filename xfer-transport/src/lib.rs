//! xfer-transport — the HTTP surface carrying chunk streams and payment
//! proposals (§6), kept as a thin adapter around `xfer-core`'s pure
//! chunk/contract logic so neither depends on the other's wire format.

pub mod client;
pub mod error;
pub mod server;
pub mod wire;

pub use client::{read_all_records, request_content, submit_proposal};
pub use error::{Result, TransportError};
pub use server::{router, SellerCatalog, SESSION_ID_HEADER};
