//! xfer-ledger — the ledger client and observer (C6): the "external
//! collaborator" that submits contract programs and notifies transfers
//! of matching transactions, kept behind the [`client::LedgerClient`]
//! trait so `xfer-core` stays free of any concrete chain dependency.

pub mod client;
pub mod cursor;
pub mod error;
pub mod observer;

pub use client::{BlockRecord, LedgerClient, MemoryLedger, TxReceipt};
pub use cursor::{CursorStore, SledCursorStore, TransferCursor};
pub use error::{LedgerError, Result};
pub use observer::{Observer, ObserverEvent, WatchId};
