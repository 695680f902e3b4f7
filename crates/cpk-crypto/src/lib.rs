//! Cryptographic primitives for chainpack.
//!
//! Provides domain-separated BLAKE3 hashing for store digests, principal
//! keypairs, and the envelope scheme for private repositories: one
//! symmetric [`ContentKey`] per repository encrypts every pack, and that key
//! is wrapped separately for each principal's public key.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod envelope;
pub mod error;
pub mod hasher;
pub mod keys;

pub use envelope::{
    decrypt_payload, encrypt_payload, generate_content_key, unwrap, wrap, ContentKey, WrappedKey,
    CONTENT_KEY_SIZE, WRAPPED_KEY_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use hasher::ContentHasher;
pub use keys::{PrivateKey, PublicKey, KEY_SIZE};
