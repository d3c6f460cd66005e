//! Ledger client (§6 "the ledger client that submits and observes
//! transactions"): the interface C5 uses to submit contract programs and
//! C6 uses to poll for new blocks. Out of scope per §1 is the real
//! consensus chain this would talk to; [`MemoryLedger`] is the reference
//! implementation used by tests and single-process demos.

use std::sync::Mutex;

use xfer_core::contract::{run, Log, Program};
use xfer_core::model::LedgerTime;

use crate::error::{LedgerError, Result};

/// One mined block: every program submitted between the previous block
/// and this one, each already run to its resulting [`Log`].
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub height: u64,
    pub time: LedgerTime,
    pub logs: Vec<Log>,
}

/// Receipt of an accepted submission.
#[derive(Debug, Clone, Copy)]
pub struct TxReceipt {
    pub height: u64,
    pub time: LedgerTime,
}

/// The ledger-facing surface C5/C6 depend on. Kept trait-based so
/// `xfer-core` and the state machine never depend on a concrete chain.
pub trait LedgerClient: Send + Sync {
    /// Submits `program` for execution; a real chain would broadcast and
    /// await confirmation, here it is applied immediately.
    fn submit(&self, program: Program) -> Result<TxReceipt>;

    /// Returns the block at `height`, or `None` if not yet produced.
    fn block_at(&self, height: u64) -> Result<Option<BlockRecord>>;

    /// Height of the most recently produced block (0 if none yet).
    fn tip_height(&self) -> u64;

    /// Ledger-time of the most recent block; authoritative "now" per §4.6 —
    /// never wall-clock time.
    fn tip_time(&self) -> LedgerTime;
}

/// In-memory ledger: every `submit` mines a new block containing exactly
/// that one program's log, with block time advancing by a fixed step.
/// Suitable for single-process tests and the CLI's ephemeral mode; not a
/// consensus implementation.
pub struct MemoryLedger {
    blocks: Mutex<Vec<BlockRecord>>,
    step_ms: u64,
}

impl MemoryLedger {
    pub fn new(genesis_time: LedgerTime, step_ms: u64) -> Self {
        Self {
            blocks: Mutex::new(vec![BlockRecord { height: 0, time: genesis_time, logs: Vec::new() }]),
            step_ms,
        }
    }
}

impl LedgerClient for MemoryLedger {
    fn submit(&self, program: Program) -> Result<TxReceipt> {
        let log = run(&program);
        let mut blocks = self.blocks.lock().map_err(|_| LedgerError::SubmissionRejected("poisoned ledger lock".into()))?;
        let prev = blocks.last().expect("genesis block always present");
        let record = BlockRecord {
            height: prev.height + 1,
            time: prev.time + self.step_ms,
            logs: vec![log],
        };
        let receipt = TxReceipt { height: record.height, time: record.time };
        blocks.push(record);
        Ok(receipt)
    }

    fn block_at(&self, height: u64) -> Result<Option<BlockRecord>> {
        let blocks = self.blocks.lock().map_err(|_| LedgerError::SubmissionRejected("poisoned ledger lock".into()))?;
        Ok(blocks.iter().find(|b| b.height == height).cloned())
    }

    fn tip_height(&self) -> u64 {
        self.blocks.lock().map(|b| b.last().map(|r| r.height).unwrap_or(0)).unwrap_or(0)
    }

    fn tip_time(&self) -> LedgerTime {
        self.blocks.lock().map(|b| b.last().map(|r| r.time).unwrap_or(0)).unwrap_or(0)
    }
}
