//! Buyer-side HTTP client (§6): posts `/request`, reads the chunk stream
//! record-by-record, and later posts the signed propose-payment program.

use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use xfer_core::contract::Program;
use xfer_core::model::{AssetId, Hash, LedgerTime};

use crate::error::{Result, TransportError};
use crate::server::SESSION_ID_HEADER;
use crate::wire::read_record;

/// Posts `/request` and returns the seller-assigned session id plus an
/// async reader positioned at the start of the chunk stream.
pub async fn request_content(
    base_url: &str,
    clear_root: Hash,
    amount: u64,
    asset_id: AssetId,
    reveal_deadline: LedgerTime,
    refund_deadline: LedgerTime,
) -> Result<(u64, impl tokio::io::AsyncRead + Unpin)> {
    let client = reqwest::Client::new();
    let form = [
        ("clearroot", hex::encode(clear_root)),
        ("amount", amount.to_string()),
        ("assetid", hex::encode(asset_id)),
        ("revealdeadline", reveal_deadline.to_string()),
        ("refunddeadline", refund_deadline.to_string()),
    ];
    let response = client
        .post(format!("{base_url}/request"))
        .form(&form)
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::NonSuccessStatus { status, body });
    }
    let session_id = response
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or(TransportError::MissingHeader(SESSION_ID_HEADER))?;

    let byte_stream = response
        .bytes_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    let reader = StreamReader::new(byte_stream);
    Ok((session_id, reader))
}

/// Reads every record from `reader` until the terminal marker, returning
/// `(index, cipher, clear_hash)` triples in order — the shape
/// `xfer_core::pipeline::receive_stream` expects.
pub async fn read_all_records(
    mut reader: impl tokio::io::AsyncRead + Unpin,
) -> Result<Vec<(u64, Vec<u8>, Hash)>> {
    let mut out = Vec::new();
    let mut index = 0u64;
    while let Some((cipher, clear_hash)) = read_record(&mut reader).await? {
        out.push((index, cipher, clear_hash));
        index += 1;
    }
    Ok(out)
}

/// Posts the buyer's propose-payment program for `session_id`; `Ok(())`
/// only on `204 No Content`.
pub async fn submit_proposal(base_url: &str, session_id: u64, program: &Program) -> Result<()> {
    let client = reqwest::Client::new();
    let body = bincode::serialize(program).map_err(|_| TransportError::MalformedFrame("program did not serialize"))?;
    let response = client
        .post(format!("{base_url}/propose-payment"))
        .header(SESSION_ID_HEADER, session_id.to_string())
        .body(body)
        .send()
        .await?;
    if response.status() == reqwest::StatusCode::NO_CONTENT {
        Ok(())
    } else {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::NonSuccessStatus { status, body })
    }
}
