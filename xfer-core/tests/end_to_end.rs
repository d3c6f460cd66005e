//! End-to-end scenarios exercising C1-C5 together, mirroring the
//! worked examples: happy path, a single bad chunk caught and proven,
//! and the change-output round trip.

use tempfile::NamedTempFile;

use xfer_core::contract::{
    build_claim_payment, build_claim_refund, build_propose_payment, build_reveal_key,
    expected_change_anchor, verify_propose_commitment, verify_refund_proof, Reservation, RefundProof,
    Utxo,
};
use xfer_core::merkle::{leaf_hash, ProofTree};
use xfer_core::model::TransferParams;
use xfer_core::pipeline::{decrypt_and_verify, receive_stream, verify_clear_root, Sender};
use xfer_core::store::{ChunkStore, FileChunkStore};

fn base_params(clear_root: [u8; 32], cipher_root: [u8; 32]) -> TransferParams {
    TransferParams {
        clear_root,
        cipher_root,
        amount: 100,
        asset_id: [0xAu8; 32],
        reveal_deadline: 10_000,
        refund_deadline: 20_000,
        buyer: [1u8; 32],
        seller: [2u8; 32],
        anchor1: [0u8; 32],
    }
}

fn reservation(total: u64, change: u64) -> Reservation {
    Reservation {
        inputs: vec![Utxo { anchor: [9u8; 32], amount: total, asset_id: [0xAu8; 32], owner: [1u8; 32] }],
        change,
    }
}

/// Scenario 1: two-chunk plaintext, honest seller, buyer verifies and
/// decrypts successfully, seller's claim-payment program is well-formed.
#[test]
fn happy_path_two_chunks() {
    let plaintext = b"0123456789ABCDEF".to_vec();
    let key = [0x11u8; 32];
    let mut sender = Sender::new(&plaintext, 8, key);
    let mut records = Vec::new();
    while let Some(rec) = sender.next_chunk().unwrap() {
        records.push(rec);
    }
    let (clear_root, cipher_root) = sender.finalize().unwrap();

    let tmp = NamedTempFile::new().unwrap();
    let mut store = FileChunkStore::create(tmp.path()).unwrap();
    let (buyer_clear, buyer_cipher) = receive_stream(&mut store, records.into_iter().map(Ok)).unwrap();
    verify_clear_root(buyer_clear, clear_root).unwrap();
    assert_eq!(buyer_cipher, cipher_root);

    let reservation = reservation(137, 37);
    let params = base_params(clear_root, cipher_root);
    let propose = build_propose_payment(&reservation, &params).unwrap();
    let parsed = verify_propose_commitment(&propose, &params).unwrap();
    assert_eq!(parsed.amount, 100);

    let collateral = Reservation {
        inputs: vec![Utxo { anchor: [8u8; 32], amount: 100, asset_id: [0xAu8; 32], owner: [2u8; 32] }],
        change: 0,
    };
    let reveal = build_reveal_key(&parsed, &collateral, key, params.seller).unwrap();
    let full_program: Vec<_> = propose.into_iter().chain(reveal).collect();
    let (propose_parsed, reveal_parsed) = xfer_core::contract::parse_log(&full_program).unwrap();
    assert_eq!(propose_parsed.clear_root, clear_root);
    let reveal_parsed = reveal_parsed.expect("reveal half must be present");
    assert_eq!(reveal_parsed.key, key);

    let recovered = decrypt_and_verify(&mut store, &key).unwrap();
    assert_eq!(recovered, plaintext);

    let claim_payment = build_claim_payment();
    assert_eq!(claim_payment.len(), 2);
}

/// Scenario 3: one bad cipher chunk; buyer detects it, builds a fraud
/// proof, and the simulated verifier confirms it.
#[test]
fn malicious_seller_single_bad_chunk_yields_fraud_proof() {
    let plaintext = b"0123456789ABCDEF".to_vec();
    let key = [0x22u8; 32];
    let mut sender = Sender::new(&plaintext, 8, key);
    let mut records = Vec::new();
    while let Some(rec) = sender.next_chunk().unwrap() {
        records.push(rec);
    }
    records[1].1[0] ^= 0xFF; // corrupt chunk 1's ciphertext after its clear hash was fixed

    let tmp = NamedTempFile::new().unwrap();
    let mut store = FileChunkStore::create(tmp.path()).unwrap();
    let leaves_clear: Vec<_> = records.iter().map(|(i, _, h)| leaf_hash(*i, h)).collect();
    let leaves_cipher: Vec<_> = records.iter().map(|(i, c, _)| leaf_hash(*i, c)).collect();
    let clear_tree = ProofTree::from_leaves(leaves_clear).unwrap();
    let cipher_tree = ProofTree::from_leaves(leaves_cipher).unwrap();

    let _ = receive_stream(&mut store, records.clone().into_iter().map(Ok)).unwrap();

    let err = decrypt_and_verify(&mut store, &key).unwrap_err();
    let bad_index = match err {
        xfer_core::Error::BadClearHash(i) => i,
        other => panic!("expected BadClearHash, got {other:?}"),
    };
    assert_eq!(bad_index, 1);

    let (bad_index_usize, bad_cipher, bad_clear_hash) = {
        let (i, c, h) = &records[bad_index as usize];
        (*i as usize, c.clone(), *h)
    };
    let cipher_proof = cipher_tree.proof_for(bad_index_usize).unwrap();
    let clear_proof = clear_tree.proof_for(bad_index_usize).unwrap();

    let proof = RefundProof {
        index: bad_index,
        cipher_chunk: bad_cipher,
        clear_hash: bad_clear_hash,
        cipher_proof: cipher_proof.to_wire_order(),
        clear_proof: clear_proof.to_wire_order(),
    };
    let claim_refund = build_claim_refund(proof.clone());
    assert_eq!(claim_refund.len(), 2);

    verify_refund_proof(&proof, &key, &clear_tree.root(), &cipher_tree.root()).unwrap();
}

/// Scenario 6: reservation with non-zero change; the change anchor the
/// builder derives is deterministic and distinct from the payment anchor.
#[test]
fn change_output_round_trip() {
    let reservation = reservation(137, 37);
    let params = base_params([5u8; 32], [6u8; 32]);
    let propose = build_propose_payment(&reservation, &params).unwrap();
    let parsed = verify_propose_commitment(&propose, &params).unwrap();
    assert_eq!(parsed.amount, 100);

    let change_anchor = expected_change_anchor(&reservation).unwrap();
    let payment_anchor = xfer_core::anchor::derive_payment_anchor(&[[9u8; 32]]);
    assert_ne!(change_anchor, payment_anchor);
}

/// A reservation with zero change must not emit a change output.
#[test]
fn zero_change_reservation_has_no_expected_change_anchor() {
    let reservation = reservation(100, 0);
    assert!(expected_change_anchor(&reservation).is_none());
}

/// Boundary: single-chunk file still round-trips through the whole
/// streaming + store + decrypt path.
#[test]
fn single_chunk_file() {
    let plaintext = b"short".to_vec();
    let key = [0x33u8; 32];
    let mut sender = Sender::new(&plaintext, 8192, key);
    let mut records = Vec::new();
    while let Some(rec) = sender.next_chunk().unwrap() {
        records.push(rec);
    }
    assert_eq!(records.len(), 1);
    let (clear_root, _cipher_root) = sender.finalize().unwrap();

    let tmp = NamedTempFile::new().unwrap();
    let mut store = FileChunkStore::create(tmp.path()).unwrap();
    let (buyer_clear, _) = receive_stream(&mut store, records.into_iter().map(Ok)).unwrap();
    assert_eq!(buyer_clear, clear_root);
    assert_eq!(store.len(), 1);
}

/// Insufficient reservation funds are rejected before any program is built.
#[test]
fn insufficient_reservation_is_rejected() {
    let reservation = reservation(10, 0);
    let params = base_params([1u8; 32], [2u8; 32]);
    let err = build_propose_payment(&reservation, &params).unwrap_err();
    assert!(matches!(err, xfer_core::Error::InsufficientFunds { need: 100, have: 10 }));
}
