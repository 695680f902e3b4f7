//! Envelope encryption for private repositories.
//!
//! A private repository has exactly one [`ContentKey`], generated at
//! registration and never replaced. Packs are sealed with it using
//! ChaCha20-Poly1305. Each principal with access holds a [`WrappedKey`]: the
//! same content key wrapped (AES-KW, RFC 3394) under a key-encryption key
//! agreed by ephemeral X25519 ECDH against the principal's public key.
//!
//! # Wire formats
//!
//! ```text
//! WrappedKey:  [ ephemeral_pubkey: 32 ][ aes_kw(content_key): 40 ]
//! payload:     [ nonce: 12 ][ ciphertext ][ tag: 16 ]
//! ```
//!
//! The payload nonce is derived from the key and the plaintext, so sealing
//! identical packs under one key yields identical bytes and hence identical
//! store digests.

use std::fmt;

use aes_kw::KekAes256;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PrivateKey, PublicKey, KEY_SIZE};

/// Size of the symmetric content key (256 bits).
pub const CONTENT_KEY_SIZE: usize = 32;
/// AES-KW adds one 8-byte integrity block.
const KW_OVERHEAD: usize = 8;
/// Size of a wrapped key on the wire.
pub const WRAPPED_KEY_SIZE: usize = KEY_SIZE + CONTENT_KEY_SIZE + KW_OVERHEAD;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

const KEK_CONTEXT: &str = "cpk 2024 envelope key-encryption-key v1";
const NONCE_CONTEXT: &str = "cpk 2024 envelope payload nonce v1";

/// The symmetric key shared by every principal of a private repository.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey([u8; CONTENT_KEY_SIZE]);

impl ContentKey {
    pub fn from_bytes(bytes: [u8; CONTENT_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CONTENT_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey(<redacted>)")
    }
}

/// A content key wrapped for one principal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrappedKey([u8; WRAPPED_KEY_SIZE]);

impl WrappedKey {
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        <[u8; WRAPPED_KEY_SIZE]>::try_from(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidLength {
                what: "wrapped key",
                expected: WRAPPED_KEY_SIZE,
                actual: bytes.len(),
            })
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn ephemeral_public(&self) -> X25519PublicKey {
        let mut eph = [0u8; KEY_SIZE];
        eph.copy_from_slice(&self.0[..KEY_SIZE]);
        X25519PublicKey::from(eph)
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey({}..)", hex::encode(&self.0[..8]))
    }
}

impl Serialize for WrappedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for WrappedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Generate a fresh content key from the OS random source.
pub fn generate_content_key() -> ContentKey {
    let mut bytes = [0u8; CONTENT_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    ContentKey(bytes)
}

/// Wrap `key` so only the holder of `recipient`'s private key can recover it.
pub fn wrap(key: &ContentKey, recipient: &PublicKey) -> CryptoResult<WrappedKey> {
    let mut eph_bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut eph_bytes);
    let ephemeral = StaticSecret::from(eph_bytes);
    let ephemeral_public = X25519PublicKey::from(&ephemeral);

    let recipient_x = recipient.to_x25519();
    let shared = ephemeral.diffie_hellman(&recipient_x);
    let kek = derive_kek(shared.as_bytes(), &ephemeral_public, &recipient_x);

    let wrapped = kek
        .wrap_vec(key.as_bytes())
        .map_err(|_| CryptoError::WrapFailed)?;

    let mut out = [0u8; WRAPPED_KEY_SIZE];
    out[..KEY_SIZE].copy_from_slice(ephemeral_public.as_bytes());
    out[KEY_SIZE..].copy_from_slice(&wrapped);
    Ok(WrappedKey(out))
}

/// Recover the content key from a copy wrapped for `private`'s public key.
pub fn unwrap(wrapped: &WrappedKey, private: &PrivateKey) -> CryptoResult<ContentKey> {
    let ephemeral_public = wrapped.ephemeral_public();
    let own_x = private.to_x25519();
    let shared = own_x.diffie_hellman(&ephemeral_public);
    let kek = derive_kek(
        shared.as_bytes(),
        &ephemeral_public,
        &X25519PublicKey::from(&own_x),
    );

    let unwrapped = kek
        .unwrap_vec(&wrapped.0[KEY_SIZE..])
        .map_err(|_| CryptoError::UnwrapFailed)?;
    let bytes = <[u8; CONTENT_KEY_SIZE]>::try_from(unwrapped.as_slice())
        .map_err(|_| CryptoError::UnwrapFailed)?;
    Ok(ContentKey(bytes))
}

/// Seal a payload under the content key.
pub fn encrypt_payload(key: &ContentKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let nonce_bytes = derive_nonce(key, plaintext);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::EncryptFailed)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a payload sealed by [`encrypt_payload`].
pub fn decrypt_payload(key: &ContentKey, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptFailed);
    }
    let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::DecryptFailed)
}

fn derive_kek(
    shared: &[u8; 32],
    ephemeral: &X25519PublicKey,
    recipient: &X25519PublicKey,
) -> KekAes256 {
    let mut material = [0u8; 96];
    material[..32].copy_from_slice(shared);
    material[32..64].copy_from_slice(ephemeral.as_bytes());
    material[64..].copy_from_slice(recipient.as_bytes());
    KekAes256::from(blake3::derive_key(KEK_CONTEXT, &material))
}

fn derive_nonce(key: &ContentKey, plaintext: &[u8]) -> [u8; NONCE_SIZE] {
    let nonce_key = blake3::derive_key(NONCE_CONTEXT, key.as_bytes());
    let digest = blake3::keyed_hash(&nonce_key, plaintext);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&digest.as_bytes()[..NONCE_SIZE]);
    nonce
}
