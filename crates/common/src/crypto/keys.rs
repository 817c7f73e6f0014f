//! RSA key pair wrappers for key wrapping and detached signatures
//!
//! Each user holds an RSA key pair generated and persisted outside this
//! core. The public key wraps per-file secrets for entries under the shared
//! directory (RSA-OAEP with SHA-256); the private key unwraps them at
//! lookup time. The pair also produces detached RSA-PSS signatures over
//! arbitrary bytes.

use rsa::{Oaep, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

/// Default modulus size in bits for generated key pairs
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("rsa error: {0}")]
    Rsa(#[from] rsa::Error),
}

/// Public half of a user's RSA key pair
///
/// Wraps per-file secrets for the shared directory and verifies detached
/// signatures.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKey(RsaPublicKey);

impl From<RsaPublicKey> for PublicKey {
    fn from(key: RsaPublicKey) -> Self {
        PublicKey(key)
    }
}

impl PublicKey {
    /// Encrypt `plaintext` for the holder of the matching private key
    ///
    /// RSA-OAEP with SHA-256, no label. Empty input returns empty output so
    /// an entry with no shared key yet stays encodable.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }
        let mut rng = rand::thread_rng();
        Ok(self.0.encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)?)
    }

    /// Verify a detached signature produced by [`PrivateKey::sign`]
    ///
    /// # Errors
    ///
    /// Returns an error if the signature does not verify for `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        let digest = Sha256::digest(data);
        Ok(self.0.verify(Pss::new::<Sha256>(), &digest, signature)?)
    }
}

/// Private half of a user's RSA key pair
///
/// Unwraps shared per-file secrets and signs arbitrary bytes. Generation
/// and PEM persistence belong to the host; this type only consumes a pair
/// supplied at mount time.
#[derive(Debug, Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl From<RsaPrivateKey> for PrivateKey {
    fn from(key: RsaPrivateKey) -> Self {
        PrivateKey(key)
    }
}

impl PrivateKey {
    /// Generate a fresh key pair with a `bits`-bit modulus
    pub fn generate(bits: usize) -> Result<Self, KeyError> {
        let mut rng = rand::thread_rng();
        Ok(Self(RsaPrivateKey::new(&mut rng, bits)?))
    }

    /// Derive the public half of this key pair
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    /// Decrypt data produced by [`PublicKey::encrypt`]
    ///
    /// Empty input returns empty output.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
        if ciphertext.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.0.decrypt(Oaep::new::<Sha256>(), ciphertext)?)
    }

    /// Produce a detached RSA-PSS signature over `SHA-256(data)`
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KeyError> {
        let digest = Sha256::digest(data);
        let mut rng = rand::thread_rng();
        Ok(self.0.sign_with_rng(&mut rng, Pss::new::<Sha256>(), &digest)?)
    }
}
