//! Key file I/O (§6 "Key file"): raw 64-byte private-key material, read
//! once at startup. The first 32 bytes are the ed25519 secret scalar
//! seed, the last 32 are the matching public key, matching
//! `ed25519_dalek::Keypair::to_bytes`'s layout.

use std::fs;
use std::path::Path;

use ed25519_dalek::Keypair;

use crate::error::{Result, WalletError};

/// Reads and parses a key file. Does not validate that the embedded
/// public key matches the secret scalar beyond what `Keypair::from_bytes`
/// itself checks.
pub fn read_key_file(path: impl AsRef<Path>) -> Result<Keypair> {
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref).map_err(|source| WalletError::KeyFileIo {
        path: path_ref.display().to_string(),
        source,
    })?;
    if bytes.len() != 64 {
        return Err(WalletError::BadKeyFileLength {
            path: path_ref.display().to_string(),
            len: bytes.len(),
        });
    }
    Keypair::from_bytes(&bytes).map_err(|_| WalletError::MalformedKey)
}

/// Writes `keypair` to `path` in the same 64-byte layout `read_key_file`
/// expects, for use by key-generation tooling.
pub fn write_key_file(path: impl AsRef<Path>, keypair: &Keypair) -> Result<()> {
    let path_ref = path.as_ref();
    fs::write(path_ref, keypair.to_bytes()).map_err(|source| WalletError::KeyFileIo {
        path: path_ref.display().to_string(),
        source,
    })
}
