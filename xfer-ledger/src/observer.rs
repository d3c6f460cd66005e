//! Ledger observer (C6, §4.6): polls the ledger client for new blocks,
//! matches completed transactions against registered watches by
//! `Anchor1` equality, and delivers each match exactly once. Per the
//! Design Note in §9 the registration set is a plain relation —
//! `(AnchorMatcher, Callback, ExpiresAt)` — not an implicit hook buried
//! in an event loop; here the "callback" is an mpsc sender so the
//! transfer task driving C5 can simply `.recv().await` it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use xfer_core::contract::{parse_log_entries, ParsedPropose, ParsedReveal};
use xfer_core::model::{LedgerTime, PubKeyBytes, TransferId};

use crate::client::LedgerClient;
use crate::cursor::{CursorStore, TransferCursor};
use crate::error::Result;

/// Delivered to a registrant when its watch resolves.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// A transaction matching the watched `Anchor1` was observed at
    /// `observed_at` (ledger time) — used for the reveal tie-break rule.
    Matched { propose: ParsedPropose, reveal: Option<ParsedReveal>, observed_at: LedgerTime },
    /// `expires_at` passed with no match.
    DeadlineElapsed,
}

pub type WatchId = u64;

struct Watch {
    id: WatchId,
    transfer_id: TransferId,
    buyer: PubKeyBytes,
    expires_at: LedgerTime,
    sender: mpsc::UnboundedSender<ObserverEvent>,
}

/// Polls `client` on a fixed interval, dispatching matches to registered
/// watches and persisting its cursor through `cursor` so a restart
/// resumes rather than re-scans from genesis.
pub struct Observer<C: LedgerClient> {
    client: Arc<C>,
    cursor: Arc<dyn CursorStore>,
    watches: Mutex<Vec<Watch>>,
    next_id: AtomicU64,
    poll_interval: Duration,
}

impl<C: LedgerClient> Observer<C> {
    pub fn new(client: Arc<C>, cursor: Arc<dyn CursorStore>, poll_interval: Duration) -> Self {
        Self { client, cursor, watches: Mutex::new(Vec::new()), next_id: AtomicU64::new(0), poll_interval }
    }

    /// Ledger-derived "now", per §4.6(a): the most recent block's
    /// timestamp, never wall-clock time.
    pub fn now(&self) -> LedgerTime {
        self.client.tip_time()
    }

    /// Registers interest in transactions whose `Anchor1` equals
    /// `transfer_id.anchor1`, expiring (with
    /// [`ObserverEvent::DeadlineElapsed`]) at `expires_at` if no match
    /// arrives first. Persists `(buyer, current tip height)` against
    /// `transfer_id` immediately, per §6 "Persisted state", so a restart
    /// before the watch resolves can recover where to resume from.
    pub fn register(
        &self,
        transfer_id: TransferId,
        buyer: PubKeyBytes,
        expires_at: LedgerTime,
    ) -> (WatchId, mpsc::UnboundedReceiver<ObserverEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded_channel();
        let cursor = TransferCursor { buyer, last_observed_height: self.client.tip_height() };
        if let Err(err) = self.cursor.store_transfer(transfer_id, cursor) {
            warn!(%err, "failed to persist initial transfer cursor");
        }
        self.watches.lock().unwrap().push(Watch { id, transfer_id, buyer, expires_at, sender });
        (id, receiver)
    }

    /// Cancels a watch before it resolves; a no-op if it already did.
    pub fn unregister(&self, id: WatchId) {
        self.watches.lock().unwrap().retain(|w| w.id != id);
    }

    /// Runs the poll loop until `cancel` fires. Intended to be spawned as
    /// the single observer task described in §5.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let mut cursor = self.cursor.load()?;
        let mut ticker = interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("observer task cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    while let Some(block) = self.client.block_at(cursor + 1)? {
                        cursor = block.height;
                        for log in block.logs {
                            match parse_log_entries(log) {
                                Ok((propose, reveal)) => self.dispatch_match(&propose, reveal, block.time),
                                Err(_) => continue,
                            }
                        }
                        self.cursor.store(cursor)?;
                    }
                    self.persist_watch_cursors(cursor);
                    self.expire_deadlines();
                }
            }
        }
    }

    /// Updates each still-active watch's persisted `last_observed_height`
    /// to `height`, the scan position just reached.
    fn persist_watch_cursors(&self, height: u64) {
        let watches = self.watches.lock().unwrap();
        for watch in watches.iter() {
            let cursor = TransferCursor { buyer: watch.buyer, last_observed_height: height };
            if let Err(err) = self.cursor.store_transfer(watch.transfer_id, cursor) {
                warn!(%err, watch_id = watch.id, "failed to persist transfer cursor");
            }
        }
    }

    fn dispatch_match(&self, propose: &ParsedPropose, reveal: Option<ParsedReveal>, observed_at: LedgerTime) {
        let mut watches = self.watches.lock().unwrap();
        let mut remaining = Vec::with_capacity(watches.len());
        for watch in watches.drain(..) {
            if watch.transfer_id.anchor1 == propose.anchor1 {
                let event = ObserverEvent::Matched { propose: propose.clone(), reveal: reveal.clone(), observed_at };
                debug!(watch_id = watch.id, "observer dispatching match");
                if watch.sender.send(event).is_err() {
                    warn!(watch_id = watch.id, "observer watch receiver dropped");
                }
            } else {
                remaining.push(watch);
            }
        }
        *watches = remaining;
    }

    fn expire_deadlines(&self) {
        let now = self.now();
        let mut watches = self.watches.lock().unwrap();
        let mut remaining = Vec::with_capacity(watches.len());
        for watch in watches.drain(..) {
            if watch.expires_at <= now {
                let _ = watch.sender.send(ObserverEvent::DeadlineElapsed);
            } else {
                remaining.push(watch);
            }
        }
        *watches = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryLedger;
    use crate::cursor::SledCursorStore;
    use tempfile::TempDir;
    use xfer_core::contract::{build_propose_payment, Reservation, Utxo};
    use xfer_core::model::{Anchor, TransferParams};

    fn reservation() -> Reservation {
        Reservation {
            inputs: vec![Utxo { anchor: [9u8; 32], amount: 100, asset_id: [0u8; 32], owner: [1u8; 32] }],
            change: 0,
        }
    }

    fn params(anchor1: Anchor) -> TransferParams {
        TransferParams {
            reveal_deadline: 5_000,
            refund_deadline: 10_000,
            buyer: [1u8; 32],
            seller: [4u8; 32],
            cipher_root: [2u8; 32],
            clear_root: [3u8; 32],
            amount: 100,
            asset_id: [0u8; 32],
            anchor1,
        }
    }

    #[tokio::test]
    async fn registered_watch_receives_matching_submission() {
        let ledger = Arc::new(MemoryLedger::new(0, 1));
        let dir = TempDir::new().unwrap();
        let cursor: Arc<dyn CursorStore> = Arc::new(SledCursorStore::open(dir.path()).unwrap());
        let observer = Arc::new(Observer::new(ledger.clone(), cursor, Duration::from_millis(5)));

        let reservation = reservation();
        // with zero change, build_propose_payment derives Anchor1 as the
        // plain merge of the reservation's input anchors.
        let anchor1 = xfer_core::anchor::merge(&[[9u8; 32]]);
        let transfer_id = TransferId::new([3u8; 32], anchor1);
        let (_id, mut rx) = observer.register(transfer_id, [1u8; 32], 1_000_000);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(observer.clone().run(cancel.clone()));

        let program = build_propose_payment(&reservation, &params(anchor1)).unwrap();
        ledger.submit(program).unwrap();

        let event = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.unwrap().unwrap();
        match event {
            ObserverEvent::Matched { propose, .. } => assert_eq!(propose.anchor1, anchor1),
            ObserverEvent::DeadlineElapsed => panic!("expected a match, not an expiry"),
        }
        cancel.cancel();
        let _ = task.await;
    }
}
