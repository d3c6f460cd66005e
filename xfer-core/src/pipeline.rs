//! Transfer pipeline (C3): the buyer-side receive logic and seller-side
//! send logic. Chunks are received, hashed, stored, and fed to the
//! interleaved Merkle builder in strict index order (§5 "Ordering"); the
//! proposal is only formed after the full stream closes and the clear
//! root has been checked (§4.5 "Commitment point").

use tracing::{debug, warn};

use crate::chunk;
use crate::error::{Error, Result};
use crate::merkle::InterleavedBuilder;
use crate::model::{Hash, Index, Key};
use crate::store::ChunkStore;

/// Receives `(index, cipher, clear_hash)` triples in order from `records`,
/// persisting each to `store` and feeding both Merkle trees. Returns the
/// computed roots once the stream closes. Does not itself check the
/// clear root against the buyer's target — see [`verify_clear_root`] —
/// so the caller can log a protocol error with both values before
/// aborting.
pub fn receive_stream<I>(store: &mut impl ChunkStore, records: I) -> Result<(Hash, Hash)>
where
    I: IntoIterator<Item = Result<(Index, Vec<u8>, Hash)>>,
{
    let mut builder = InterleavedBuilder::new();
    let mut count = 0u64;
    for record in records {
        let (index, cipher, clear_hash) = record?;
        store.append(index, &cipher, clear_hash)?;
        builder.push(index, clear_hash, &cipher)?;
        count += 1;
        debug!(index, "chunk received and hashed");
    }
    if count == 0 {
        return Err(Error::Other("chunk stream contained no records"));
    }
    builder.finalize()
}

/// Checks the buyer-supplied target clear root against what was
/// computed while streaming. A mismatch means the seller committed to
/// the wrong content; the transfer must be aborted without proposing
/// payment (§4.3).
pub fn verify_clear_root(computed: Hash, target: Hash) -> Result<()> {
    if computed != target {
        warn!(
            computed = %hex::encode(computed),
            target = %hex::encode(target),
            "clear root mismatch, aborting before proposal"
        );
        return Err(Error::ClearRootMismatch {
            expected: hex::encode(target),
            computed: hex::encode(computed),
        });
    }
    Ok(())
}

/// Given the revealed key, iterates chunks in index order, decrypts
/// each, recomputes its clear hash, and compares it to the stored value.
/// Returns the first mismatching index as a [`Error::BadClearHash`];
/// both stores are left untouched so a fraud proof can be built.
pub fn decrypt_and_verify(store: &mut impl ChunkStore, key: &Key) -> Result<Vec<u8>> {
    let mut plaintext = Vec::new();
    for i in 0..store.len() {
        let (cipher, stored_clear_hash) = store
            .get(i)?
            .ok_or_else(|| Error::Other("chunk store shorter than its reported length"))?;
        let decrypted = chunk::decrypt(&cipher, i, key);
        let recomputed = chunk::clear_hash(i, &decrypted);
        if recomputed != stored_clear_hash {
            return Err(Error::BadClearHash(i));
        }
        plaintext.extend_from_slice(&decrypted);
    }
    Ok(plaintext)
}

/// Seller-side send: given plaintext and a freshly chosen key, computes
/// each chunk's ciphertext and clear hash, in order, for the caller to
/// write to the wire — and concurrently folds them into the interleaved
/// builder so both roots are known once the plaintext is exhausted.
pub struct Sender<'a> {
    plaintext: &'a [u8],
    chunk_size: usize,
    key: Key,
    index: Index,
    builder: InterleavedBuilder,
}

impl<'a> Sender<'a> {
    pub fn new(plaintext: &'a [u8], chunk_size: usize, key: Key) -> Self {
        Self {
            plaintext,
            chunk_size,
            key,
            index: 0,
            builder: InterleavedBuilder::new(),
        }
    }

    /// Returns the next `(index, cipher, clear_hash)` record, or `None`
    /// once all chunks have been emitted.
    pub fn next_chunk(&mut self) -> Result<Option<(Index, Vec<u8>, Hash)>> {
        let start = (self.index as usize) * self.chunk_size;
        if start >= self.plaintext.len() {
            return Ok(None);
        }
        let end = (start + self.chunk_size).min(self.plaintext.len());
        let plain = &self.plaintext[start..end];
        let index = self.index;
        let clear = chunk::clear_hash(index, plain);
        let cipher = chunk::encrypt(plain, index, &self.key);
        self.builder.push(index, clear, &cipher)?;
        self.index += 1;
        Ok(Some((index, cipher, clear)))
    }

    /// Consumes the sender once the plaintext is exhausted, returning
    /// `(ClearRoot, CipherRoot)`.
    pub fn finalize(self) -> Result<(Hash, Hash)> {
        self.builder.finalize()
    }
}
