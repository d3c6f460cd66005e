//! Chunk stores: an indexed random-access container over fixed-size
//! records, per the Design Note in §9. Operations are `append`, `get(i)`,
//! `len()`. Failures propagate as transport errors to the caller (the
//! transfer pipeline, C3).
//!
//! [`FileChunkStore`] is the reference on-disk implementation: one
//! append-only file of `varint(len) || cipher || clear_hash[32]` records,
//! with an in-memory offset index rebuilt as records are appended. Stores
//! are retained on error for recovery and deleted on successful
//! completion, per §6 "Persisted state".

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{decode_varint, encode_varint, Hash, Index};

/// A persisted, append-only, randomly-readable sequence of chunk records.
pub trait ChunkStore {
    fn append(&mut self, index: Index, cipher: &[u8], clear_hash: Hash) -> Result<()>;
    fn get(&mut self, index: Index) -> Result<Option<(Vec<u8>, Hash)>>;
    fn len(&self) -> u64;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// File-backed [`ChunkStore`].
pub struct FileChunkStore {
    file: File,
    offsets: Vec<u64>,
    path: PathBuf,
}

impl FileChunkStore {
    /// Creates a fresh store at `path`, truncating any existing file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::Io(format!("opening chunk store {path:?}: {e}")))?;
        Ok(Self {
            file,
            offsets: Vec::new(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the backing file. Called on successful transfer completion.
    pub fn remove(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path)
            .map_err(|e| Error::Io(format!("removing chunk store {path:?}: {e}")))
    }
}

impl ChunkStore for FileChunkStore {
    fn append(&mut self, index: Index, cipher: &[u8], clear_hash: Hash) -> Result<()> {
        if index != self.offsets.len() as u64 {
            return Err(Error::Other("chunk store append must be in strict index order"));
        }
        let offset = self
            .file
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::Io(format!("seeking chunk store: {e}")))?;
        self.offsets.push(offset);
        let len = encode_varint(cipher.len() as u64);
        self.file
            .write_all(&len)
            .and_then(|_| self.file.write_all(cipher))
            .and_then(|_| self.file.write_all(&clear_hash))
            .map_err(|e| Error::Io(format!("writing chunk record: {e}")))
    }

    fn get(&mut self, index: Index) -> Result<Option<(Vec<u8>, Hash)>> {
        let Some(&offset) = self.offsets.get(index as usize) else {
            return Ok(None);
        };
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::Io(format!("seeking chunk store: {e}")))?;
        // A varint is at most 10 bytes; read a small header window first.
        let mut header = [0u8; 10];
        let mut read_so_far = 0usize;
        let (len, header_len) = loop {
            self.file
                .read_exact(&mut header[read_so_far..read_so_far + 1])
                .map_err(|e| Error::Io(format!("reading chunk header: {e}")))?;
            read_so_far += 1;
            if let Some(result) = decode_varint(&header[..read_so_far]) {
                break result;
            }
            if read_so_far == header.len() {
                return Err(Error::Other("corrupt chunk store: varint too long"));
            }
        };
        let _ = header_len;
        let mut cipher = vec![0u8; len as usize];
        self.file
            .read_exact(&mut cipher)
            .map_err(|e| Error::Io(format!("reading chunk body: {e}")))?;
        let mut clear_hash = [0u8; 32];
        self.file
            .read_exact(&mut clear_hash)
            .map_err(|e| Error::Io(format!("reading clear hash: {e}")))?;
        Ok(Some((cipher, clear_hash)))
    }

    fn len(&self) -> u64 {
        self.offsets.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn append_then_get_round_trips() {
        let tmp = NamedTempFile::new().unwrap();
        let mut store = FileChunkStore::create(tmp.path()).unwrap();
        store.append(0, b"hello", [1u8; 32]).unwrap();
        store.append(1, b"world!!", [2u8; 32]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(0).unwrap(),
            Some((b"hello".to_vec(), [1u8; 32]))
        );
        assert_eq!(
            store.get(1).unwrap(),
            Some((b"world!!".to_vec(), [2u8; 32]))
        );
        assert_eq!(store.get(2).unwrap(), None);
    }

    #[test]
    fn out_of_order_append_rejected() {
        let tmp = NamedTempFile::new().unwrap();
        let mut store = FileChunkStore::create(tmp.path()).unwrap();
        assert!(store.append(1, b"x", [0u8; 32]).is_err());
    }
}
