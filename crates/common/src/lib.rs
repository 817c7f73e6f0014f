/**
 * Cryptographic types and operations.
 *  - The authenticated symmetric envelope used for
 *    encrypted names and file payloads
 *  - RSA key pair wrappers for wrapping per-file keys
 *    under a user's public key and for detached signatures
 */
pub mod crypto;

pub mod prelude {
    pub use crate::crypto::{envelope, PrivateKey, PublicKey, Secret};
}
