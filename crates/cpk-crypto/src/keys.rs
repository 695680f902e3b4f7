//! Principal keypairs.
//!
//! Principals hold Ed25519 keypairs; for key wrapping the keys are mapped to
//! their X25519 (Montgomery) form. Key buffers are accepted in whatever shape
//! a caller has them in: 32 raw bytes, 64 hex characters, or PEM with tag
//! `PRIVATE KEY` / `PUBLIC KEY`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::{CryptoError, CryptoResult};

/// Size of both halves of a keypair in bytes.
pub const KEY_SIZE: usize = 32;

const PRIVATE_PEM_TAG: &str = "PRIVATE KEY";
const PUBLIC_PEM_TAG: &str = "PUBLIC KEY";

/// A principal's private key.
#[derive(Clone)]
pub struct PrivateKey(ed25519_dalek::SigningKey);

/// A principal's public key, as recorded on the ledger next to each wrapped
/// content key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

impl PrivateKey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// Parse an opaque key buffer (raw, hex, or PEM).
    pub fn from_buffer(buf: &[u8]) -> CryptoResult<Self> {
        decode_buffer(buf, PRIVATE_PEM_TAG).map(Self::from_bytes)
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(PRIVATE_PEM_TAG, self.to_bytes().to_vec()))
    }

    pub(crate) fn to_x25519(&self) -> StaticSecret {
        StaticSecret::from(self.0.to_scalar_bytes())
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> CryptoResult<Self> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidKey("not a valid curve point".into()))
    }

    /// Parse an opaque key buffer (raw, hex, or PEM).
    pub fn from_buffer(buf: &[u8]) -> CryptoResult<Self> {
        Self::from_bytes(decode_buffer(buf, PUBLIC_PEM_TAG)?)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(PUBLIC_PEM_TAG, self.to_bytes().to_vec()))
    }

    pub(crate) fn to_x25519(&self) -> X25519PublicKey {
        X25519PublicKey::from(self.0.to_montgomery().to_bytes())
    }
}

fn decode_buffer(buf: &[u8], tag: &str) -> CryptoResult<[u8; KEY_SIZE]> {
    if let Ok(raw) = <[u8; KEY_SIZE]>::try_from(buf) {
        return Ok(raw);
    }

    let text = std::str::from_utf8(buf)
        .map_err(|_| CryptoError::InvalidKey("unrecognized key encoding".into()))?
        .trim();

    let contents = if text.starts_with("-----BEGIN") {
        let parsed = pem::parse(text).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        if parsed.tag() != tag {
            return Err(CryptoError::InvalidKey(format!(
                "expected PEM tag {tag}, found {}",
                parsed.tag()
            )));
        }
        parsed.into_contents()
    } else {
        hex::decode(text).map_err(|_| CryptoError::InvalidKey("unrecognized key encoding".into()))?
    };

    <[u8; KEY_SIZE]>::try_from(contents.as_slice()).map_err(|_| CryptoError::InvalidLength {
        what: "key",
        expected: KEY_SIZE,
        actual: contents.len(),
    })
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(<redacted>)")
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
