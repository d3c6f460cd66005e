//! Protocol state machine (C5): the per-party driver described in §4.5.
//!
//! Per the Design Note in §9, each party's state is a value in an
//! enumerated set, and transitions are handled by a single function that
//! reacts to input events (`ChunkReceived`/`StreamClosed`/`ObserverTx`/
//! `DeadlineFired`/`Cancelled`, specialized per party below) rather than
//! being encoded in the shape of a call chain. `step` returns the
//! [`Action`]s the caller (the CLI binary, or a test harness) must carry
//! out; the state machine itself performs no I/O.

use crate::model::Index;

/// Side effects the driver asks its caller to perform. Kept data-only so
/// the state machine can be unit tested without any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    HoldReservation,
    CancelReservation,
    SubmitProposal,
    RegisterObserverCallback,
    UnregisterObserverCallback,
    BeginDecryption,
    SubmitClaimRefund,
    SubmitClaimPayment,
    CloseChunkStreams,
    RemoveTemporaryFiles,
}

/// Buyer-side states (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyerState {
    Idle,
    Requested,
    Proposed,
    Decrypting,
    Done,
    Expired,
    Refunding,
    Refunded,
    Lost,
    Aborted,
}

/// Events the buyer driver reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuyerEvent {
    /// The request has been posted and funds reserved.
    RequestPosted,
    /// The chunk stream closed; `clear_root_matches` reflects whether the
    /// computed clear root equals the buyer's target.
    StreamClosed { clear_root_matches: bool },
    /// A reveal-key transaction was observed. `at_or_before_deadline`
    /// implements the tie-break rule: a reveal observed in the same tick
    /// as the deadline is valid if its ledger timestamp is at or before
    /// the deadline.
    RevealObserved { at_or_before_deadline: bool },
    /// `RevealDeadline` passed with no reveal observed.
    RevealDeadlineExpired,
    /// Decryption finished with every chunk's hash matching.
    AllChunksValid,
    /// Decryption found a bad chunk at `index`.
    BadClearHash { index: Index },
    /// The claim-refund transaction was accepted by the ledger.
    ClaimRefundAccepted,
    /// `RefundDeadline` passed before a claim-refund was submitted.
    RefundDeadlineExpired,
    /// A fatal error or user interrupt before commitment.
    Cancelled,
}

/// Explicit buyer transition table; unhandled `(state, event)` pairs are
/// rejected rather than silently ignored, since an unexpected event
/// usually indicates a duplicate delivery or a caller bug.
#[derive(Debug, Default)]
pub struct BuyerMachine {
    state: BuyerState,
}

impl Default for BuyerState {
    fn default() -> Self {
        BuyerState::Idle
    }
}

impl BuyerMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BuyerState {
        self.state
    }

    /// Applies `event`, returning the actions to perform, or `None` if
    /// the event does not apply in the current state (the caller should
    /// treat this as an idempotent duplicate delivery, per §5, rather
    /// than an error, unless it has already checked that invariant
    /// itself).
    pub fn step(&mut self, event: BuyerEvent) -> Option<Vec<Action>> {
        use BuyerEvent::*;
        use BuyerState::*;
        let (next, actions) = match (self.state, event) {
            (Idle, RequestPosted) => (Requested, vec![Action::HoldReservation]),
            (Requested, StreamClosed { clear_root_matches: false }) => {
                (Aborted, vec![Action::CancelReservation])
            }
            // Commitment point: the proposal is submitted only after the
            // full stream closes with a matching clear root. From here on
            // funds are committed; transport errors on the proposal POST
            // must not cancel the reservation (§4.5).
            (Requested, StreamClosed { clear_root_matches: true }) => {
                (Proposed, vec![Action::SubmitProposal, Action::RegisterObserverCallback])
            }
            (Proposed, RevealObserved { at_or_before_deadline: true }) => {
                (Decrypting, vec![Action::UnregisterObserverCallback, Action::BeginDecryption])
            }
            (Proposed, RevealObserved { at_or_before_deadline: false }) => {
                // observed, but after the deadline: treated identically to
                // no reveal at all.
                (Expired, vec![Action::UnregisterObserverCallback])
            }
            (Proposed, RevealDeadlineExpired) => (Expired, vec![Action::UnregisterObserverCallback]),
            (Decrypting, AllChunksValid) => {
                (Done, vec![Action::RemoveTemporaryFiles])
            }
            (Decrypting, BadClearHash { .. }) => {
                (Refunding, vec![Action::SubmitClaimRefund])
            }
            (Refunding, ClaimRefundAccepted) => (Refunded, vec![Action::RemoveTemporaryFiles]),
            (Refunding, RefundDeadlineExpired) => (Lost, vec![]),
            (Idle, Cancelled) | (Requested, Cancelled) => {
                (Aborted, vec![Action::CancelReservation, Action::CloseChunkStreams])
            }
            _ => return None,
        };
        self.state = next;
        Some(actions)
    }
}

/// Seller-side states (§4.5): `IDLE → SERVING → AWAITING_PROPOSAL →
/// REVEALING → AWAITING_REFUND_WINDOW → CLAIMING_PAYMENT → PAID`, with
/// symmetric failure branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellerState {
    Idle,
    Serving,
    AwaitingProposal,
    Revealing,
    AwaitingRefundWindow,
    ClaimingPayment,
    Paid,
    Cancelled,
    Defrauded,
}

/// Events the seller driver reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellerEvent {
    RequestReceived,
    StreamSent,
    ProposalReceived { valid: bool },
    RevealSubmitted,
    RefundWindowElapsed,
    ClaimRefundObserved,
    ClaimPaymentAccepted,
    Cancelled,
}

#[derive(Debug, Default)]
pub struct SellerMachine {
    state: SellerState,
}

impl Default for SellerState {
    fn default() -> Self {
        SellerState::Idle
    }
}

impl SellerMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SellerState {
        self.state
    }

    pub fn step(&mut self, event: SellerEvent) -> Option<Vec<Action>> {
        use SellerEvent::*;
        use SellerState::*;
        let (next, actions) = match (self.state, event) {
            (Idle, RequestReceived) => (Serving, vec![]),
            (Serving, StreamSent) => (AwaitingProposal, vec![Action::RegisterObserverCallback]),
            (AwaitingProposal, ProposalReceived { valid: true }) => {
                (Revealing, vec![Action::UnregisterObserverCallback])
            }
            (AwaitingProposal, ProposalReceived { valid: false }) => {
                (Cancelled, vec![Action::UnregisterObserverCallback])
            }
            (Revealing, RevealSubmitted) => {
                (AwaitingRefundWindow, vec![Action::RegisterObserverCallback])
            }
            (AwaitingRefundWindow, ClaimRefundObserved) => {
                (Defrauded, vec![Action::UnregisterObserverCallback])
            }
            (AwaitingRefundWindow, RefundWindowElapsed) => {
                (ClaimingPayment, vec![Action::UnregisterObserverCallback, Action::SubmitClaimPayment])
            }
            (ClaimingPayment, ClaimPaymentAccepted) => (Paid, vec![]),
            (Idle, Cancelled) | (Serving, Cancelled) | (AwaitingProposal, Cancelled) => {
                (Cancelled, vec![Action::CloseChunkStreams])
            }
            _ => return None,
        };
        self.state = next;
        Some(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buyer_happy_path() {
        let mut m = BuyerMachine::new();
        assert_eq!(m.step(BuyerEvent::RequestPosted), Some(vec![Action::HoldReservation]));
        assert_eq!(m.state(), BuyerState::Requested);
        m.step(BuyerEvent::StreamClosed { clear_root_matches: true }).unwrap();
        assert_eq!(m.state(), BuyerState::Proposed);
        m.step(BuyerEvent::RevealObserved { at_or_before_deadline: true }).unwrap();
        assert_eq!(m.state(), BuyerState::Decrypting);
        m.step(BuyerEvent::AllChunksValid).unwrap();
        assert_eq!(m.state(), BuyerState::Done);
    }

    #[test]
    fn buyer_wrong_root_aborts_before_proposal() {
        let mut m = BuyerMachine::new();
        m.step(BuyerEvent::RequestPosted).unwrap();
        let actions = m.step(BuyerEvent::StreamClosed { clear_root_matches: false }).unwrap();
        assert_eq!(m.state(), BuyerState::Aborted);
        assert!(actions.contains(&Action::CancelReservation));
    }

    #[test]
    fn buyer_silent_seller_expires() {
        let mut m = BuyerMachine::new();
        m.step(BuyerEvent::RequestPosted).unwrap();
        m.step(BuyerEvent::StreamClosed { clear_root_matches: true }).unwrap();
        m.step(BuyerEvent::RevealDeadlineExpired).unwrap();
        assert_eq!(m.state(), BuyerState::Expired);
    }

    #[test]
    fn buyer_fraud_path_leads_to_refunded() {
        let mut m = BuyerMachine::new();
        m.step(BuyerEvent::RequestPosted).unwrap();
        m.step(BuyerEvent::StreamClosed { clear_root_matches: true }).unwrap();
        m.step(BuyerEvent::RevealObserved { at_or_before_deadline: true }).unwrap();
        m.step(BuyerEvent::BadClearHash { index: 1 }).unwrap();
        assert_eq!(m.state(), BuyerState::Refunding);
        m.step(BuyerEvent::ClaimRefundAccepted).unwrap();
        assert_eq!(m.state(), BuyerState::Refunded);
    }

    #[test]
    fn buyer_refund_window_elapsing_is_lost() {
        let mut m = BuyerMachine::new();
        m.step(BuyerEvent::RequestPosted).unwrap();
        m.step(BuyerEvent::StreamClosed { clear_root_matches: true }).unwrap();
        m.step(BuyerEvent::RevealObserved { at_or_before_deadline: true }).unwrap();
        m.step(BuyerEvent::BadClearHash { index: 0 }).unwrap();
        m.step(BuyerEvent::RefundDeadlineExpired).unwrap();
        assert_eq!(m.state(), BuyerState::Lost);
    }

    #[test]
    fn unexpected_event_is_rejected_not_silently_applied() {
        let mut m = BuyerMachine::new();
        assert_eq!(m.step(BuyerEvent::AllChunksValid), None);
        assert_eq!(m.state(), BuyerState::Idle);
    }

    #[test]
    fn seller_happy_path() {
        let mut m = SellerMachine::new();
        m.step(SellerEvent::RequestReceived).unwrap();
        m.step(SellerEvent::StreamSent).unwrap();
        m.step(SellerEvent::ProposalReceived { valid: true }).unwrap();
        m.step(SellerEvent::RevealSubmitted).unwrap();
        m.step(SellerEvent::RefundWindowElapsed).unwrap();
        m.step(SellerEvent::ClaimPaymentAccepted).unwrap();
        assert_eq!(m.state(), SellerState::Paid);
    }

    #[test]
    fn seller_defrauded_path() {
        let mut m = SellerMachine::new();
        m.step(SellerEvent::RequestReceived).unwrap();
        m.step(SellerEvent::StreamSent).unwrap();
        m.step(SellerEvent::ProposalReceived { valid: true }).unwrap();
        m.step(SellerEvent::RevealSubmitted).unwrap();
        m.step(SellerEvent::ClaimRefundObserved).unwrap();
        assert_eq!(m.state(), SellerState::Defrauded);
    }
}
