pub mod envelope;
mod keys;

pub use envelope::{EnvelopeError, Secret, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use keys::{KeyError, PrivateKey, PublicKey};
