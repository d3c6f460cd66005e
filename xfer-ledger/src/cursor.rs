//! Persisted observer state (§4.6, §6 "Persisted state"): the observer's
//! own scan cursor (how far into the ledger it has processed, globally),
//! plus — keyed by transfer identifier — the buyer identity and the
//! height at which that specific transfer was last observed, so a watch
//! surviving a restart resumes from its own registration point rather
//! than the observer's current scan position.

use sled::Db;

use xfer_core::model::{PubKeyBytes, TransferId};

use crate::error::Result;

const CURSOR_KEY: &[u8] = b"observer/cursor";
const TRANSFER_PREFIX: &[u8] = b"observer/transfer/";

/// `(buyer_pubkey, last_observed_block_height)` for one watched transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCursor {
    pub buyer: PubKeyBytes,
    pub last_observed_height: u64,
}

impl TransferCursor {
    fn encode(&self) -> [u8; 40] {
        let mut out = [0u8; 40];
        out[..32].copy_from_slice(&self.buyer);
        out[32..].copy_from_slice(&self.last_observed_height.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 40 {
            return None;
        }
        let mut buyer = [0u8; 32];
        buyer.copy_from_slice(&bytes[..32]);
        let mut height = [0u8; 8];
        height.copy_from_slice(&bytes[32..]);
        Some(Self { buyer, last_observed_height: u64::from_le_bytes(height) })
    }
}

fn transfer_key(id: TransferId) -> Vec<u8> {
    let mut key = Vec::with_capacity(TRANSFER_PREFIX.len() + 64);
    key.extend_from_slice(TRANSFER_PREFIX);
    key.extend_from_slice(&id.clear_root);
    key.extend_from_slice(&id.anchor1);
    key
}

/// Durable store for the observer's scan cursor and per-transfer watch state.
pub trait CursorStore: Send + Sync {
    fn load(&self) -> Result<u64>;
    fn store(&self, height: u64) -> Result<()>;
    /// Looks up the last height a specific watched transfer was observed at.
    fn load_transfer(&self, id: TransferId) -> Result<Option<TransferCursor>>;
    /// Persists (or updates) a specific transfer's watch state.
    fn store_transfer(&self, id: TransferId, cursor: TransferCursor) -> Result<()>;
}

/// `sled`-backed cursor store; a single flush per write keeps each update
/// transactional.
pub struct SledCursorStore {
    db: Db,
}

impl SledCursorStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl CursorStore for SledCursorStore {
    fn load(&self) -> Result<u64> {
        match self.db.get(CURSOR_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_ref().try_into().unwrap_or([0u8; 8]);
                Ok(u64::from_le_bytes(arr))
            }
            None => Ok(0),
        }
    }

    fn store(&self, height: u64) -> Result<()> {
        self.db.insert(CURSOR_KEY, &height.to_le_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    fn load_transfer(&self, id: TransferId) -> Result<Option<TransferCursor>> {
        match self.db.get(transfer_key(id))? {
            Some(bytes) => Ok(TransferCursor::decode(bytes.as_ref())),
            None => Ok(None),
        }
    }

    fn store_transfer(&self, id: TransferId, cursor: TransferCursor) -> Result<()> {
        self.db.insert(transfer_key(id), &cursor.encode())?;
        self.db.flush()?;
        Ok(())
    }
}
