// Distributed under the MIT software license.

//! Authenticated-encrypted sealing/opening of control messages.
//!
//! Uses the `crypto_box` crate's `SalsaBox` (X25519 key agreement +
//! XSalsa20-Poly1305 AEAD), which is byte-for-byte what the existing C++
//! deployment does via libsodium's `crypto_box_easy`/`crypto_box_open_easy`
//! (see `original_source/src/autod/sodium_aead.cpp`). Each endpoint holds
//! one long-term static keypair; there is no per-session ephemeral
//! exchange, so the same keys authenticate every envelope for the life of
//! the process.

use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use thiserror::Error;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const MAC_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("decryption failed: MAC check or envelope malformed")]
    Decrypt,
    #[error("envelope too short: {0} bytes")]
    EnvelopeTooShort(usize),
}

/// A sealed, authenticated-encrypted envelope: `nonce (24B) ||
/// ciphertext(cleartext_len + 16B MAC)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope(pub Vec<u8>);

impl SealedEnvelope {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// This endpoint's long-term identity: our secret key plus the single
/// peer's long-term public key it speaks to.
pub struct Identity {
    secret: SecretKey,
    public: PublicKey,
}

impl Identity {
    pub fn from_secret_bytes(secret_bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        let secret = SecretKey::from(secret_bytes);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public.as_bytes().to_owned()
    }

    pub fn secret_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.secret.to_bytes()
    }

    /// Seal `cleartext` for `peer_public` using our secret key. A fresh
    /// random nonce is generated and prepended to the ciphertext.
    pub fn seal(&self, peer_public: &[u8; PUBLIC_KEY_LEN], cleartext: &[u8]) -> SealedEnvelope {
        let their_key = PublicKey::from(*peer_public);
        let b = SalsaBox::new(&their_key, &self.secret);
        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        let ciphertext = b
            .encrypt(&nonce, cleartext)
            .expect("crypto_box encryption is infallible for bounded plaintext");

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        SealedEnvelope(out)
    }

    /// Open an envelope sealed by `peer_public`. Returns `Err` on any MAC
    /// failure or malformed envelope — never a partially filled message.
    pub fn open(
        &self,
        peer_public: &[u8; PUBLIC_KEY_LEN],
        envelope: &SealedEnvelope,
    ) -> Result<Vec<u8>, CryptoError> {
        let buf = envelope.as_bytes();
        if buf.len() < NONCE_LEN + MAC_LEN {
            return Err(CryptoError::EnvelopeTooShort(buf.len()));
        }
        let (nonce_bytes, ciphertext) = buf.split_at(NONCE_LEN);
        let nonce = crypto_box::Nonce::clone_from_slice(nonce_bytes);

        let their_key = PublicKey::from(*peer_public);
        let b = SalsaBox::new(&their_key, &self.secret);
        b.decrypt(&nonce, ciphertext).map_err(|_| CryptoError::Decrypt)
    }
}
