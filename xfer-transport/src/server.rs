//! Seller-side HTTP surface (§6): `POST /request` streams chunks for a
//! known piece of content; `POST /propose-payment` accepts the buyer's
//! signed contract program and countersigns by accepting or rejecting.
//!
//! Catalog lookup (mapping a requested `ClearRoot` to plaintext) is
//! explicitly out of scope (§1 Non-goals: "seller-side catalog
//! management") — callers provide one via [`SellerCatalog`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use xfer_core::contract::verify_propose_commitment;
use xfer_core::model::{Amount, AssetId, Hash, Key, LedgerTime, TransferParams};
use xfer_core::pipeline::Sender as ChunkSender;

use crate::wire::{encode_record, encode_terminal};

/// Header carrying the seller-assigned id correlating a chunk-stream
/// response to its later `propose-payment` call.
pub const SESSION_ID_HEADER: &str = "x-xfer-session-id";

/// Supplies plaintext + encryption key for a requested `ClearRoot`.
/// What content lives behind a root and how it got there is the
/// out-of-scope catalog; this trait is the seam.
pub trait SellerCatalog: Send + Sync {
    fn lookup(&self, clear_root: Hash) -> Option<(Vec<u8>, Key)>;
}

struct Session {
    amount: Amount,
    asset_id: AssetId,
    clear_root: Hash,
    cipher_root: Hash,
    reveal_deadline: LedgerTime,
    refund_deadline: LedgerTime,
}

struct AppState {
    catalog: Arc<dyn SellerCatalog>,
    chunk_size: usize,
    sessions: Mutex<HashMap<u64, Session>>,
    next_session: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RequestForm {
    clearroot: String,
    amount: u64,
    assetid: String,
    revealdeadline: u64,
    refunddeadline: u64,
}

/// Builds the seller's router over `catalog`.
pub fn router(catalog: Arc<dyn SellerCatalog>, chunk_size: usize) -> Router {
    let state = Arc::new(AppState {
        catalog,
        chunk_size,
        sessions: Mutex::new(HashMap::new()),
        next_session: AtomicU64::new(1),
    });
    Router::new()
        .route("/request", post(handle_request))
        .route("/propose-payment", post(handle_propose))
        .with_state(state)
}

fn parse_hash(s: &str) -> Option<Hash> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

async fn handle_request(State(state): State<Arc<AppState>>, Form(form): Form<RequestForm>) -> Response {
    let Some(clear_root) = parse_hash(&form.clearroot) else {
        return (StatusCode::BAD_REQUEST, "malformed clearroot").into_response();
    };
    let Some(asset_id) = parse_hash(&form.assetid) else {
        return (StatusCode::BAD_REQUEST, "malformed assetid").into_response();
    };
    let Some((plaintext, key)) = state.catalog.lookup(clear_root) else {
        return (StatusCode::NOT_FOUND, "unknown content").into_response();
    };

    let session_id = state.next_session.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = mpsc::unbounded_channel::<std::io::Result<bytes::Bytes>>();
    let chunk_size = state.chunk_size;
    let state_for_task = state.clone();

    tokio::spawn(async move {
        let mut sender = ChunkSender::new(&plaintext, chunk_size, key);
        loop {
            match sender.next_chunk() {
                Ok(Some((_index, cipher, clear_hash))) => {
                    let mut buf = Vec::new();
                    encode_record(&mut buf, &cipher, clear_hash);
                    if tx.send(Ok(bytes::Bytes::from(buf))).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "chunk sender failed mid-stream");
                    let _ = tx.send(Err(std::io::Error::new(std::io::ErrorKind::Other, err.to_string())));
                    return;
                }
            }
        }
        let mut terminal = Vec::new();
        encode_terminal(&mut terminal);
        let _ = tx.send(Ok(bytes::Bytes::from(terminal)));

        match sender.finalize() {
            Ok((clear_root, cipher_root)) => {
                state_for_task.sessions.lock().unwrap().insert(
                    session_id,
                    Session {
                        amount: form.amount,
                        asset_id,
                        clear_root,
                        cipher_root,
                        reveal_deadline: form.revealdeadline,
                        refund_deadline: form.refunddeadline,
                    },
                );
                info!(session_id, "stream finalized");
            }
            Err(err) => warn!(%err, "failed to finalize chunk stream"),
        }
    });

    let mut headers = HeaderMap::new();
    headers.insert(SESSION_ID_HEADER, session_id.to_string().parse().unwrap());
    (headers, Body::from_stream(UnboundedReceiverStream::new(rx))).into_response()
}

async fn handle_propose(State(state): State<Arc<AppState>>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let Some(session_id) = headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    else {
        return (StatusCode::BAD_REQUEST, "missing session id").into_response();
    };
    let session = {
        let sessions = state.sessions.lock().unwrap();
        match sessions.get(&session_id) {
            Some(s) => Session {
                amount: s.amount,
                asset_id: s.asset_id,
                clear_root: s.clear_root,
                cipher_root: s.cipher_root,
                reveal_deadline: s.reveal_deadline,
                refund_deadline: s.refund_deadline,
            },
            None => return (StatusCode::NOT_FOUND, "unknown session").into_response(),
        }
    };
    let program: xfer_core::contract::Program = match bincode::deserialize(&body) {
        Ok(p) => p,
        Err(_) => return (StatusCode::BAD_REQUEST, "malformed program").into_response(),
    };
    let expected = TransferParams {
        clear_root: session.clear_root,
        cipher_root: session.cipher_root,
        amount: session.amount,
        asset_id: session.asset_id,
        reveal_deadline: session.reveal_deadline,
        refund_deadline: session.refund_deadline,
        buyer: [0u8; 32],
        seller: [0u8; 32],
        anchor1: [0u8; 32],
    };
    match verify_propose_commitment(&program, &expected) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    }
}
