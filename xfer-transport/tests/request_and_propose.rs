//! Exercises the client/server round trip over a real TCP socket: `/request`
//! streaming into `receive_stream`, and `/propose-payment` submission —
//! the path described in §6 that unit tests on either side alone can't
//! cover.

use std::sync::Arc;

use xfer_core::contract::{build_propose_payment, verify_propose_commitment, Reservation, Utxo};
use xfer_core::model::{Hash, Key, TransferParams};
use xfer_core::pipeline::{receive_stream, verify_clear_root, Sender};
use xfer_core::store::FileChunkStore;
use xfer_transport::client::{read_all_records, request_content, submit_proposal};
use xfer_transport::server::SellerCatalog;

struct SingleFileCatalog {
    root: Hash,
    plaintext: Vec<u8>,
    key: Key,
}

impl SellerCatalog for SingleFileCatalog {
    fn lookup(&self, clear_root: Hash) -> Option<(Vec<u8>, Key)> {
        if clear_root == self.root {
            Some((self.plaintext.clone(), self.key))
        } else {
            None
        }
    }
}

#[tokio::test]
async fn buyer_round_trips_request_and_proposal_against_a_live_server() {
    let plaintext = b"0123456789ABCDEF".to_vec();
    let key = [5u8; 32];
    let mut sender = Sender::new(&plaintext, 8, key);
    while sender.next_chunk().unwrap().is_some() {}
    let (root, _) = sender.finalize().unwrap();

    let catalog = Arc::new(SingleFileCatalog { root, plaintext, key });
    let app = xfer_transport::router(catalog, 8);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let base_url = format!("http://{addr}");
    let asset_id = [0xAu8; 32];
    let (session_id, reader) = request_content(&base_url, root, 100, asset_id, 10_000, 20_000).await.unwrap();
    let records = read_all_records(reader).await.unwrap();
    assert_eq!(records.len(), 2);

    let tmp = tempfile::NamedTempFile::new().unwrap();
    let mut store = FileChunkStore::create(tmp.path()).unwrap();
    let (clear_root, cipher_root) = receive_stream(&mut store, records.into_iter().map(Ok)).unwrap();
    verify_clear_root(clear_root, root).unwrap();

    let reservation = Reservation {
        inputs: vec![Utxo { anchor: [1u8; 32], amount: 100, asset_id, owner: [2u8; 32] }],
        change: 0,
    };
    let params = TransferParams {
        clear_root,
        cipher_root,
        amount: 100,
        asset_id,
        reveal_deadline: 10_000,
        refund_deadline: 20_000,
        buyer: [2u8; 32],
        seller: [3u8; 32],
        anchor1: [0u8; 32],
    };
    let program = build_propose_payment(&reservation, &params).unwrap();
    verify_propose_commitment(&program, &params).unwrap();

    submit_proposal(&base_url, session_id, &program).await.unwrap();
}

#[tokio::test]
async fn request_for_unknown_content_is_rejected() {
    let catalog = Arc::new(SingleFileCatalog { root: [0u8; 32], plaintext: vec![1, 2, 3], key: [0u8; 32] });
    let app = xfer_transport::router(catalog, 8);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let base_url = format!("http://{addr}");
    let err = request_content(&base_url, [9u8; 32], 1, [0u8; 32], 10, 20).await.unwrap_err();
    assert!(matches!(err, xfer_transport::TransportError::NonSuccessStatus { status: 404, .. }));
}
