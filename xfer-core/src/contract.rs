//! Contract program builder (C4): emits the ledger program that escrows
//! payment + collateral, records commitments, releases on key reveal, and
//! permits refund-by-proof; and parses the ledger log back into
//! structured form.
//!
//! The "stack-based ledger scripting language with a persistent execution
//! log" of §4.4 is modeled here as a small internal interpreter: a
//! [`Program`] is a sequence of [`Instruction`]s, and running one produces
//! a [`Log`] — an ordered list of [`LogEntry`] values. The actual signing,
//! consensus, and chain-execution machinery that would run such a program
//! against real funds is out of scope (§1 Non-goals: the underlying VM
//! and signature primitives remain an external collaborator); what is
//! real here is the log layout, the builder, and the parser, which
//! reproduce the exact positional contract of §4.4/§6.
//!
//! Layout is positional and must be preserved exactly, per the Design
//! Note in §9: propose-phase contributes one `Escrow` marker followed by
//! seven literal entries (`RevealDeadline, RefundDeadline, Buyer,
//! CipherRoot, ClearRoot, Amount, AssetID`), with `Anchor1` carried on the
//! marker itself; reveal-phase contributes a `Merge` marker followed by
//! four literal entries (`Anchor2, Key, Seller, OutputID`).

use serde::{Deserialize, Serialize};

use crate::anchor;
use crate::error::{Error, Result};
use crate::merkle::ProofStep;
use crate::model::{Amount, Anchor, AssetId, Hash, Index, Key, LedgerTime, PubKeyBytes, TransferParams};

/// Well-known seed identifying the escrow contract body. A real
/// signature program would pin this value; here it plays the same role
/// for [`parse_log`] and the builder to agree on.
pub const ESCROW_SEED: Hash = *b"xfer-fair-exchange-escrow-v1.000";

/// A spendable ledger output available to be consumed as a transaction
/// input (§3 "Reservation").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub anchor: Anchor,
    pub amount: Amount,
    pub asset_id: AssetId,
    pub owner: PubKeyBytes,
}

/// An ordered set of unspent outputs totalling at least the required
/// amount, plus a change value; must be either consumed by a finalized
/// transaction or explicitly cancelled (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub inputs: Vec<Utxo>,
    pub change: Amount,
}

impl Reservation {
    pub fn total(&self) -> Amount {
        self.inputs.iter().map(|u| u.amount).sum()
    }

    fn anchors(&self) -> Vec<Anchor> {
        self.inputs.iter().map(|u| u.anchor).collect()
    }
}

/// A literal value pushed onto the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogValue {
    Time(LedgerTime),
    PubKey(PubKeyBytes),
    Hash32(Hash),
    Amount(Amount),
    AssetId(AssetId),
}

/// One entry of the persistent execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// `'R'` — marks escrow contract instantiation; carries `Anchor1`.
    Escrow { seed: Hash, anchor1: Anchor },
    /// `'L'` (merge block marker) — marks the post-collateral state.
    Merge { seed: Hash },
    /// `'L'` (literal) — one of the seven propose-phase or four
    /// reveal-phase values.
    Literal(LogValue),
}

pub type Log = Vec<LogEntry>;

/// A single VM instruction. `run` interprets a [`Program`] into a [`Log`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Consumes a reservation's inputs, merging their anchors.
    MergeInputs(Vec<Anchor>),
    /// Instantiates the escrow contract, binding the seven propose
    /// parameters and recording `Anchor1` (derived from the most recent
    /// `MergeInputs`/split).
    InstantiateEscrow {
        anchor1: Anchor,
        params: TransferParams,
    },
    /// Splits the merged input value into a payment output (to the
    /// escrow) and a change output back to the buyer, if `change > 0`.
    SplitChange { change: Amount },
    /// Merges the seller's collateral inputs with the escrowed payment
    /// and reveals the key.
    MergeCollateralAndReveal {
        collateral_anchors: Vec<Anchor>,
        anchor2: Anchor,
        key: Key,
        seller: PubKeyBytes,
        output_id: Hash,
    },
    /// Rehydrates the escrow tuple and calls it with `selector`
    /// (`0` = claim-payment, `1` = claim-refund).
    Call {
        selector: u8,
        refund_proof: Option<RefundProof>,
    },
    Finalize,
}

pub type Program = Vec<Instruction>;

/// The fraud proof pushed onto a claim-refund call: two Merkle inclusion
/// proofs (cipher and clear) for the same bad index, the clear hash
/// committed for that index, the raw cipher chunk, and the index itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundProof {
    pub index: Index,
    pub cipher_chunk: Vec<u8>,
    pub clear_hash: Hash,
    pub cipher_proof: Vec<ProofStep>,
    pub clear_proof: Vec<ProofStep>,
}

/// Interprets `program`, producing the log a real execution would leave
/// behind. Pure and total over well-formed programs built by this
/// module's constructors.
pub fn run(program: &Program) -> Log {
    let mut log = Log::new();
    for instr in program {
        match instr {
            Instruction::MergeInputs(_) | Instruction::SplitChange { .. } | Instruction::Finalize => {}
            Instruction::InstantiateEscrow { anchor1, params } => {
                log.push(LogEntry::Escrow {
                    seed: ESCROW_SEED,
                    anchor1: *anchor1,
                });
                log.push(LogEntry::Literal(LogValue::Time(params.reveal_deadline)));
                log.push(LogEntry::Literal(LogValue::Time(params.refund_deadline)));
                log.push(LogEntry::Literal(LogValue::PubKey(params.buyer)));
                log.push(LogEntry::Literal(LogValue::Hash32(params.cipher_root)));
                log.push(LogEntry::Literal(LogValue::Hash32(params.clear_root)));
                log.push(LogEntry::Literal(LogValue::Amount(params.amount)));
                log.push(LogEntry::Literal(LogValue::AssetId(params.asset_id)));
            }
            Instruction::MergeCollateralAndReveal {
                anchor2,
                key,
                seller,
                output_id,
                ..
            } => {
                log.push(LogEntry::Merge { seed: ESCROW_SEED });
                log.push(LogEntry::Literal(LogValue::Hash32(*anchor2)));
                log.push(LogEntry::Literal(LogValue::Hash32(*key)));
                log.push(LogEntry::Literal(LogValue::PubKey(*seller)));
                log.push(LogEntry::Literal(LogValue::Hash32(*output_id)));
            }
            Instruction::Call { .. } => {}
        }
    }
    log
}

/// The seven propose-phase fields plus `Anchor1`, recovered by
/// [`parse_log`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPropose {
    pub reveal_deadline: LedgerTime,
    pub refund_deadline: LedgerTime,
    pub buyer: PubKeyBytes,
    pub cipher_root: Hash,
    pub clear_root: Hash,
    pub amount: Amount,
    pub asset_id: AssetId,
    pub anchor1: Anchor,
}

/// The four reveal-phase fields, recovered by [`parse_log`] when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReveal {
    pub anchor2: Anchor,
    pub key: Key,
    pub seller: PubKeyBytes,
    pub output_id: Hash,
}

/// Executes `program` and scans the resulting log for the escrow
/// contract marker (`'R'` with [`ESCROW_SEED`]), reading the subsequent
/// seven entries in fixed order. If a post-merge block (`'L'`/`Merge`
/// with the same seed) is also present, reads its following four entries
/// too. Missing markers yield `None` for that half.
pub fn parse_log(program: &Program) -> Result<(ParsedPropose, Option<ParsedReveal>)> {
    parse_log_entries(run(program))
}

/// As [`parse_log`], but scans an already-executed [`Log`] directly —
/// what an observer does with a log pulled out of a mined block, without
/// re-running the program that produced it.
pub fn parse_log_entries(log: Log) -> Result<(ParsedPropose, Option<ParsedReveal>)> {
    let mut iter = log.into_iter();
    let propose = loop {
        match iter.next() {
            Some(LogEntry::Escrow { seed, anchor1 }) if seed == ESCROW_SEED => {
                break parse_propose_tail(&mut iter, anchor1)?;
            }
            Some(_) => continue,
            None => return Err(Error::MissingContractEntry),
        }
    };
    let reveal = loop {
        match iter.next() {
            Some(LogEntry::Merge { seed }) if seed == ESCROW_SEED => {
                break Some(parse_reveal_tail(&mut iter)?);
            }
            Some(_) => continue,
            None => break None,
        }
    };
    Ok((propose, reveal))
}

fn next_literal(iter: &mut impl Iterator<Item = LogEntry>) -> Result<LogValue> {
    match iter.next() {
        Some(LogEntry::Literal(v)) => Ok(v),
        _ => Err(Error::MissingContractEntry),
    }
}

fn parse_propose_tail(iter: &mut impl Iterator<Item = LogEntry>, anchor1: Anchor) -> Result<ParsedPropose> {
    let reveal_deadline = match next_literal(iter)? {
        LogValue::Time(t) => t,
        _ => return Err(Error::MissingContractEntry),
    };
    let refund_deadline = match next_literal(iter)? {
        LogValue::Time(t) => t,
        _ => return Err(Error::MissingContractEntry),
    };
    let buyer = match next_literal(iter)? {
        LogValue::PubKey(p) => p,
        _ => return Err(Error::MissingContractEntry),
    };
    let cipher_root = match next_literal(iter)? {
        LogValue::Hash32(h) => h,
        _ => return Err(Error::MissingContractEntry),
    };
    let clear_root = match next_literal(iter)? {
        LogValue::Hash32(h) => h,
        _ => return Err(Error::MissingContractEntry),
    };
    let amount = match next_literal(iter)? {
        LogValue::Amount(a) => a,
        _ => return Err(Error::MissingContractEntry),
    };
    let asset_id = match next_literal(iter)? {
        LogValue::AssetId(a) => a,
        _ => return Err(Error::MissingContractEntry),
    };
    Ok(ParsedPropose {
        reveal_deadline,
        refund_deadline,
        buyer,
        cipher_root,
        clear_root,
        amount,
        asset_id,
        anchor1,
    })
}

fn parse_reveal_tail(iter: &mut impl Iterator<Item = LogEntry>) -> Result<ParsedReveal> {
    let anchor2 = match next_literal(iter)? {
        LogValue::Hash32(h) => h,
        _ => return Err(Error::MissingContractEntry),
    };
    let key = match next_literal(iter)? {
        LogValue::Hash32(h) => h,
        _ => return Err(Error::MissingContractEntry),
    };
    let seller = match next_literal(iter)? {
        LogValue::PubKey(p) => p,
        _ => return Err(Error::MissingContractEntry),
    };
    let output_id = match next_literal(iter)? {
        LogValue::Hash32(h) => h,
        _ => return Err(Error::MissingContractEntry),
    };
    Ok(ParsedReveal {
        anchor2,
        key,
        seller,
        output_id,
    })
}

/// Builds the propose-payment program: consumes `reservation`'s inputs,
/// produces change if any, then instantiates the escrow contract.
///
/// Each consumed input's deferred signature check (modeled by
/// [`verify_propose_commitment`]) inspects the resulting log and
/// confirms every committed parameter matches what was signed, and that
/// a produced change output's id is the deterministically derived one —
/// this is what makes substituting an alternate contract body invalidate
/// every input signature (scenario 6 in §8).
pub fn build_propose_payment(reservation: &Reservation, params: &TransferParams) -> Result<Program> {
    let total = reservation.total();
    if total < params.amount {
        return Err(Error::InsufficientFunds {
            need: params.amount,
            have: total,
        });
    }
    let inputs = reservation.anchors();
    let mut program = vec![Instruction::MergeInputs(inputs.clone())];
    if reservation.change > 0 {
        program.push(Instruction::SplitChange {
            change: reservation.change,
        });
    }
    let anchor1 = if reservation.change > 0 {
        anchor::derive_payment_anchor(&inputs)
    } else {
        anchor::merge(&inputs)
    };
    program.push(Instruction::InstantiateEscrow {
        anchor1,
        params: params.clone(),
    });
    program.push(Instruction::Finalize);
    Ok(program)
}

/// Re-derives the change output anchor a propose-payment program would
/// have produced, for the deferred signature check described above.
pub fn expected_change_anchor(reservation: &Reservation) -> Option<Anchor> {
    if reservation.change == 0 {
        return None;
    }
    Some(anchor::derive_change_anchor(&reservation.anchors()))
}

/// Validates a received propose-payment program against the parameters
/// the seller expects before countersigning; discrepancies are fatal
/// (§4.4 "Reveal-key program").
pub fn verify_propose_commitment(program: &Program, expected: &TransferParams) -> Result<ParsedPropose> {
    let (parsed, _) = parse_log(program)?;
    let fields: [(&'static str, String, String); 6] = [
        (
            "clear_root",
            hex::encode(expected.clear_root),
            hex::encode(parsed.clear_root),
        ),
        (
            "cipher_root",
            hex::encode(expected.cipher_root),
            hex::encode(parsed.cipher_root),
        ),
        ("amount", expected.amount.to_string(), parsed.amount.to_string()),
        (
            "asset_id",
            hex::encode(expected.asset_id),
            hex::encode(parsed.asset_id),
        ),
        (
            "reveal_deadline",
            expected.reveal_deadline.to_string(),
            parsed.reveal_deadline.to_string(),
        ),
        (
            "refund_deadline",
            expected.refund_deadline.to_string(),
            parsed.refund_deadline.to_string(),
        ),
    ];
    for (field, want, got) in fields {
        if want != got {
            return Err(Error::ParameterMismatch {
                field,
                expected: want,
                got,
            });
        }
    }
    Ok(parsed)
}

/// Appends the reveal-key program: consumes seller-owned collateral
/// outputs totalling at least `propose.amount`, merges them with the
/// buyer's escrowed value, and reveals `key`.
pub fn build_reveal_key(
    propose: &ParsedPropose,
    collateral: &Reservation,
    key: Key,
    seller: PubKeyBytes,
) -> Result<Program> {
    if collateral.total() < propose.amount {
        return Err(Error::InsufficientFunds {
            need: propose.amount,
            have: collateral.total(),
        });
    }
    let collateral_anchors = collateral.anchors();
    let mut merge_inputs = collateral_anchors.clone();
    merge_inputs.push(propose.anchor1);
    let anchor2 = anchor::merge(&merge_inputs);
    let output_id = anchor::split(&anchor2, 0, 1);
    let program = vec![
        Instruction::MergeCollateralAndReveal {
            collateral_anchors,
            anchor2,
            key,
            seller,
            output_id,
        },
        Instruction::Finalize,
    ];
    Ok(program)
}

/// Builds the claim-payment program: rehydrates the escrow tuple and
/// calls it with selector `0`. Valid only post-`RefundDeadline`; deadline
/// enforcement itself belongs to the (external) execution engine, not
/// this builder.
pub fn build_claim_payment() -> Program {
    vec![
        Instruction::Call {
            selector: 0,
            refund_proof: None,
        },
        Instruction::Finalize,
    ]
}

/// Builds the claim-refund program: rehydrates the escrow tuple, pushes
/// the fraud proof, and calls with selector `1`.
pub fn build_claim_refund(proof: RefundProof) -> Program {
    vec![
        Instruction::Call {
            selector: 1,
            refund_proof: Some(proof),
        },
        Instruction::Finalize,
    ]
}

/// Simulates the on-chain verifier's refund check (§4.4 "Claim-refund
/// program"): recomputes `clear_hash(i, decrypt(cipher_chunk, i, key))`,
/// checks it differs from the committed clear hash, and checks both
/// Merkle proofs validate against the committed roots.
pub fn verify_refund_proof(
    proof: &RefundProof,
    key: &Key,
    committed_clear_root: &Hash,
    committed_cipher_root: &Hash,
) -> Result<()> {
    use crate::chunk;
    use crate::merkle::{leaf_hash, Proof as MerkleProofT};

    let decrypted = chunk::decrypt(&proof.cipher_chunk, proof.index, key);
    let recomputed = chunk::clear_hash(proof.index, &decrypted);
    if recomputed == proof.clear_hash {
        return Err(Error::Other(
            "refund proof does not demonstrate a bad chunk: clear hash matches",
        ));
    }

    let cipher_leaf = leaf_hash(proof.index, &proof.cipher_chunk);
    let cipher_merkle_proof = MerkleProofT {
        leaf_hash: cipher_leaf,
        steps: proof.cipher_proof.clone(),
    };
    if !cipher_merkle_proof.verify(committed_cipher_root) {
        return Err(Error::InvalidProof(proof.index));
    }

    let clear_leaf = leaf_hash(proof.index, &proof.clear_hash);
    let clear_merkle_proof = MerkleProofT {
        leaf_hash: clear_leaf,
        steps: proof.clear_proof.clone(),
    };
    if !clear_merkle_proof.verify(committed_clear_root) {
        return Err(Error::InvalidProof(proof.index));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> TransferParams {
        TransferParams {
            clear_root: [1u8; 32],
            cipher_root: [2u8; 32],
            amount: 100,
            asset_id: [3u8; 32],
            reveal_deadline: 10_000,
            refund_deadline: 20_000,
            buyer: [4u8; 32],
            seller: [5u8; 32],
            anchor1: [0u8; 32], // recomputed by the builder
        }
    }

    fn reservation(total: Amount, change: Amount) -> Reservation {
        Reservation {
            inputs: vec![Utxo {
                anchor: [9u8; 32],
                amount: total,
                asset_id: [3u8; 32],
                owner: [4u8; 32],
            }],
            change,
        }
    }

    #[test]
    fn propose_then_parse_round_trips() {
        let params = sample_params();
        let program = build_propose_payment(&reservation(100, 0), &params).unwrap();
        let (parsed, reveal) = parse_log(&program).unwrap();
        assert_eq!(parsed.clear_root, params.clear_root);
        assert_eq!(parsed.cipher_root, params.cipher_root);
        assert_eq!(parsed.amount, params.amount);
        assert_eq!(parsed.asset_id, params.asset_id);
        assert_eq!(parsed.reveal_deadline, params.reveal_deadline);
        assert_eq!(parsed.refund_deadline, params.refund_deadline);
        assert_eq!(parsed.buyer, params.buyer);
        assert!(reveal.is_none());
    }

    #[test]
    fn change_output_anchor_is_deterministic() {
        let res = reservation(137, 37);
        let expected = expected_change_anchor(&res).unwrap();
        let expected_again = expected_change_anchor(&res).unwrap();
        assert_eq!(expected, expected_again);
        let params = sample_params();
        let program = build_propose_payment(&res, &params).unwrap();
        let (parsed, _) = parse_log(&program).unwrap();
        // tampering the reservation's change changes the derived anchor1
        let mut other = res.clone();
        other.change = 1;
        let other_program = build_propose_payment(&other, &params).unwrap();
        let (other_parsed, _) = parse_log(&other_program).unwrap();
        assert_ne!(parsed.anchor1, other_parsed.anchor1);
    }

    #[test]
    fn reveal_then_parse_recovers_both_halves() {
        let params = sample_params();
        let propose_program = build_propose_payment(&reservation(100, 0), &params).unwrap();
        let (propose, _) = parse_log(&propose_program).unwrap();
        let key = [6u8; 32];
        let reveal_program = build_reveal_key(&propose, &reservation(100, 0), key, params.seller).unwrap();
        let mut combined = propose_program.clone();
        combined.extend(reveal_program);
        let (parsed_propose, parsed_reveal) = parse_log(&combined).unwrap();
        assert_eq!(parsed_propose.anchor1, propose.anchor1);
        let reveal = parsed_reveal.expect("reveal block present");
        assert_eq!(reveal.key, key);
        assert_eq!(reveal.seller, params.seller);
    }

    #[test]
    fn insufficient_funds_rejected() {
        let params = sample_params();
        let err = build_propose_payment(&reservation(50, 0), &params).unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientFunds {
                need: 100,
                have: 50
            }
        );
    }

    #[test]
    fn parameter_mismatch_is_fatal() {
        let params = sample_params();
        let program = build_propose_payment(&reservation(100, 0), &params).unwrap();
        let mut tampered = params.clone();
        tampered.amount = 999;
        let err = verify_propose_commitment(&program, &tampered).unwrap_err();
        assert!(matches!(err, Error::ParameterMismatch { field: "amount", .. }));
    }
}
