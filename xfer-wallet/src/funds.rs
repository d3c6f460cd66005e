//! Funds source (§3 "Reservation"): selects unspent outputs to cover a
//! requested amount, holding them until the caller either commits (the
//! transaction that consumes them finalized) or cancels (the transfer
//! aborted before commitment). §5 requires reservations be revocable
//! exactly once — double-commit and double-cancel are rejected here
//! rather than silently accepted.

use std::collections::HashMap;

use tracing::debug;
use xfer_core::contract::{Reservation, Utxo};
use xfer_core::model::{Amount, AssetId};

use crate::error::{Result, WalletError};

/// Opaque handle identifying a held reservation.
pub type ReservationHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Held,
    Committed,
    Cancelled,
}

struct HeldReservation {
    reservation: Reservation,
    status: Status,
}

/// A source of spendable outputs a wallet can draw reservations from.
pub trait FundsSource {
    /// Selects unspent outputs of `asset_id` totalling at least `amount`,
    /// removing them from the available pool and returning a handle plus
    /// the [`Reservation`] (inputs + change) to hand to the contract
    /// builder.
    fn reserve(&mut self, amount: Amount, asset_id: AssetId) -> Result<(ReservationHandle, Reservation)>;

    /// Marks a reservation as consumed by a finalized transaction.
    fn commit(&mut self, handle: ReservationHandle) -> Result<()>;

    /// Releases a reservation's outputs back to the available pool.
    fn cancel(&mut self, handle: ReservationHandle) -> Result<()>;
}

/// An in-process funds source backed by a flat list of unspent outputs;
/// the reference implementation used by tests and the CLI's `--ephemeral`
/// mode (a persistent, `sled`-backed source is the production path, see
/// `xfer-ledger`).
#[derive(Default)]
pub struct InMemoryFundsSource {
    available: Vec<Utxo>,
    held: HashMap<ReservationHandle, HeldReservation>,
    next_handle: ReservationHandle,
}

impl InMemoryFundsSource {
    pub fn new(utxos: Vec<Utxo>) -> Self {
        Self {
            available: utxos,
            held: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Total unreserved balance of `asset_id`.
    pub fn available_balance(&self, asset_id: AssetId) -> Amount {
        self.available.iter().filter(|u| u.asset_id == asset_id).map(|u| u.amount).sum()
    }
}

impl FundsSource for InMemoryFundsSource {
    fn reserve(&mut self, amount: Amount, asset_id: AssetId) -> Result<(ReservationHandle, Reservation)> {
        let mut picked = Vec::new();
        let mut total: Amount = 0;
        let mut remaining = Vec::new();
        for utxo in self.available.drain(..) {
            if total < amount && utxo.asset_id == asset_id {
                total += utxo.amount;
                picked.push(utxo);
            } else {
                remaining.push(utxo);
            }
        }
        self.available = remaining;
        if total < amount {
            // return what we picked; nothing has been durably removed yet.
            self.available.extend(picked);
            return Err(WalletError::InsufficientFunds { need: amount, have: total });
        }
        let change = total - amount;
        let reservation = Reservation { inputs: picked, change };
        let handle = self.next_handle;
        self.next_handle += 1;
        debug!(handle, total, change, "reservation held");
        self.held.insert(handle, HeldReservation { reservation: reservation.clone(), status: Status::Held });
        Ok((handle, reservation))
    }

    fn commit(&mut self, handle: ReservationHandle) -> Result<()> {
        let entry = self.held.get_mut(&handle).ok_or(WalletError::UnknownReservation(handle))?;
        if entry.status != Status::Held {
            return Err(WalletError::AlreadyResolved(handle));
        }
        entry.status = Status::Committed;
        Ok(())
    }

    fn cancel(&mut self, handle: ReservationHandle) -> Result<()> {
        let entry = self.held.get_mut(&handle).ok_or(WalletError::UnknownReservation(handle))?;
        if entry.status != Status::Held {
            return Err(WalletError::AlreadyResolved(handle));
        }
        entry.status = Status::Cancelled;
        self.available.extend(entry.reservation.inputs.clone());
        Ok(())
    }
}
