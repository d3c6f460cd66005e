//! Chunk-stream wire codec (§6 "the HTTP transport carrying chunks and
//! payment proposals"). Each record is `varuint(len) || cipher[len] ||
//! clear_hash[32]`, in strict index order; the index itself is never on
//! the wire, since it is always the record's position in the stream. A
//! bare `varuint(0)` with nothing following is the terminal marker
//! resolving the open question in §9 about signalling end-of-stream
//! independent of the transport's own framing.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use xfer_core::model::{decode_varint, encode_varint, Hash};

use crate::error::{Result, TransportError};

/// Appends one chunk record to `buf`.
pub fn encode_record(buf: &mut Vec<u8>, cipher: &[u8], clear_hash: Hash) {
    buf.extend_from_slice(&encode_varint(cipher.len() as u64));
    buf.extend_from_slice(cipher);
    buf.extend_from_slice(&clear_hash);
}

/// Appends the terminal zero-length record.
pub fn encode_terminal(buf: &mut Vec<u8>) {
    buf.push(0x00);
}

/// Writes `encode_record` directly to an async sink, for callers
/// streaming chunks without buffering the whole body.
pub async fn write_record(writer: &mut (impl AsyncWrite + Unpin), cipher: &[u8], clear_hash: Hash) -> Result<()> {
    let mut buf = Vec::with_capacity(10 + cipher.len() + 32);
    encode_record(&mut buf, cipher, clear_hash);
    writer.write_all(&buf).await.map_err(TransportError::Io)?;
    Ok(())
}

pub async fn write_terminal(writer: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
    writer.write_all(&[0x00]).await.map_err(TransportError::Io)
}

/// Reads one record from `reader`. Returns `Ok(None)` on the terminal
/// marker, `Ok(Some((cipher, clear_hash)))` for a real chunk.
pub async fn read_record(reader: &mut (impl AsyncRead + Unpin)) -> Result<Option<(Vec<u8>, Hash)>> {
    let len = read_varint_async(reader).await?;
    if len == 0 {
        return Ok(None);
    }
    let mut cipher = vec![0u8; len as usize];
    reader.read_exact(&mut cipher).await.map_err(TransportError::Io)?;
    let mut clear_hash = [0u8; 32];
    reader.read_exact(&mut clear_hash).await.map_err(TransportError::Io)?;
    Ok(Some((cipher, clear_hash)))
}

async fn read_varint_async(reader: &mut (impl AsyncRead + Unpin)) -> Result<u64> {
    let mut encoded = Vec::with_capacity(10);
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).await.map_err(TransportError::Io)?;
        encoded.push(byte[0]);
        if byte[0] & 0x80 == 0 {
            break;
        }
        if encoded.len() > 10 {
            return Err(TransportError::MalformedFrame("varint too long"));
        }
    }
    let (value, consumed) = decode_varint(&encoded).ok_or(TransportError::MalformedFrame("bad varint"))?;
    debug_assert_eq!(consumed, encoded.len());
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_two_records_then_terminal() {
        let mut buf = Vec::new();
        encode_record(&mut buf, b"hello", [1u8; 32]);
        encode_record(&mut buf, b"world!", [2u8; 32]);
        encode_terminal(&mut buf);

        let mut cursor = std::io::Cursor::new(buf);
        let first = read_record(&mut cursor).await.unwrap().unwrap();
        assert_eq!(first.0, b"hello");
        assert_eq!(first.1, [1u8; 32]);
        let second = read_record(&mut cursor).await.unwrap().unwrap();
        assert_eq!(second.0, b"world!");
        assert!(read_record(&mut cursor).await.unwrap().is_none());
    }
}
