//! Authenticated symmetric envelope for names and payloads
//!
//! Every encrypted byte string in the filesystem (directory entry names,
//! file contents, wrapped per-file keys) uses the same sealed layout:
//! `nonce (12 bytes) || ciphertext || auth tag (16 bytes)`, AES-256-GCM.
//!
//! The empty key is the root placeholder: sealing or opening with it passes
//! the input through unchanged, which is what keeps the globally visible
//! `shared` directory entry (plaintext name, no wrapped key) representable
//! in the same edge schema as everything else.

use std::ops::Deref;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use serde::{Deserialize, Serialize};

/// Size of an AES-256-GCM key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;
/// Size of the nonce prefix in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;
/// Size of the trailing authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Errors that can occur while sealing or opening an envelope
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid key length, expected {KEY_SIZE} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("ciphertext too short for nonce")]
    TooShort,
    #[error("encrypt error")]
    Encrypt,
    #[error("decrypt error")]
    Decrypt,
    #[error("failed to generate nonce: {0}")]
    Rng(#[from] getrandom::Error),
}

/// Encrypt `plaintext` under `key`.
///
/// Returns `nonce || ciphertext || tag` with a freshly sampled random nonce.
/// The empty key passes the plaintext through unchanged.
///
/// # Errors
///
/// Fails if the key is neither empty nor exactly [`KEY_SIZE`] bytes, or if
/// the system RNG fails.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if key.is_empty() {
        return Ok(plaintext.to_vec());
    }
    let cipher = cipher_for(key)?;

    // Never reuse a nonce under a given key; a fresh random draw per seal
    // keeps collisions negligible below 2^32 messages.
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EnvelopeError::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data produced by [`encrypt`].
///
/// The empty key passes the input through unchanged, and empty input opens
/// to empty output under any key ("no wrapped key yet" stays encodable).
///
/// # Errors
///
/// Fails if the key length is wrong, the input is shorter than the nonce
/// prefix, or the authentication tag does not verify.
pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if key.is_empty() || data.is_empty() {
        return Ok(data.to_vec());
    }
    let cipher = cipher_for(key)?;

    if data.len() < NONCE_SIZE {
        return Err(EnvelopeError::TooShort);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EnvelopeError::Decrypt)
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, EnvelopeError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| EnvelopeError::InvalidKeyLength(key.len()))
}

/// A 256-bit symmetric key
///
/// Every node in the filesystem owns one `Secret`; names and payloads under
/// the node are sealed with it, and the secret itself travels wrapped under
/// the parent's key (or the viewer's RSA public key for shared entries).
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Secret([u8; KEY_SIZE]);

impl Deref for Secret {
    type Target = [u8; KEY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; KEY_SIZE]> for Secret {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Secret(bytes)
    }
}

impl Secret {
    /// Generate a new random secret using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; KEY_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    /// Create a secret from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly [`KEY_SIZE`] bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, EnvelopeError> {
        if data.len() != KEY_SIZE {
            return Err(EnvelopeError::InvalidKeyLength(data.len()));
        }
        let mut buff = [0; KEY_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Get a reference to the key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Seal `plaintext` under this secret
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        encrypt(self.bytes(), plaintext)
    }

    /// Open data sealed under this secret
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        decrypt(self.bytes(), data)
    }
}
