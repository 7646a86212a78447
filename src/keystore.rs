// Distributed under the MIT software license.

//! Long-term X25519 keypair persistence.
//!
//! Grounded on `original_source/lib/wg-tools/sec_store.c` and
//! `net/encrypted.rs::load_or_generate_keypair` (generate-if-absent,
//! 0600 permissions on Unix).

use crate::crypto::Identity;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key file {0:?} has the wrong length (expected 32 bytes)")]
    WrongLength(std::path::PathBuf),
    #[error("key file {0:?} does not contain valid hex: {1}")]
    InvalidHex(std::path::PathBuf, hex::FromHexError),
}

/// Load the secret key at `path`, or generate and persist a fresh one if
/// absent.
pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Identity, KeyStoreError> {
    let path = path.as_ref();

    if path.exists() {
        let data = std::fs::read(path)?;
        if data.len() != 32 {
            return Err(KeyStoreError::WrongLength(path.to_path_buf()));
        }
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&data);
        tracing::info!("loaded keypair from {path:?}");
        return Ok(Identity::from_secret_bytes(secret));
    }

    let identity = Identity::generate();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, identity.secret_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }

    tracing::info!(
        "generated new keypair at {path:?}, pubkey={}",
        hex::encode(identity.public_key())
    );
    Ok(identity)
}

/// Load the fleet-wide peer identity public key, hex-encoded on one line.
/// This key is provisioned out of band (the same value is installed on
/// every client and on the coordinator) and is not generated here.
pub fn load_peer_public_key(path: impl AsRef<Path>) -> Result<[u8; 32], KeyStoreError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    let bytes = hex::decode(contents.trim()).map_err(|e| KeyStoreError::InvalidHex(path.to_path_buf(), e))?;
    if bytes.len() != 32 {
        return Err(KeyStoreError::WrongLength(path.to_path_buf()));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
