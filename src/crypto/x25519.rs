// SPDX-License-Identifier: MIT OR Apache-2.0

//! Elliptic-curve Diffie–Hellman (ECDH) key agreement scheme (X25519).
use std::fmt;

use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::crypto::secret::Secret;

/// 256-bit secret key size.
pub const SECRET_KEY_SIZE: usize = 32;

/// 256-bit public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Serialized public key size: key-type tag byte followed by the curve point.
pub const TAGGED_PUBLIC_KEY_SIZE: usize = PUBLIC_KEY_SIZE + 1;

/// Supported elliptic curve key types.
///
/// Only one curve exists today but every serialized public key carries its type tag, so
/// introducing another curve is a compile-time checked change at every match site.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyType {
    X25519,
}

impl KeyType {
    pub fn tag(&self) -> u8 {
        match self {
            KeyType::X25519 => 0x05,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, X25519Error> {
        match tag {
            0x05 => Ok(KeyType::X25519),
            _ => Err(X25519Error::UnknownKeyType(tag)),
        }
    }
}

/// Secret Curve25519 key used for ECDH key agreement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey(Secret<SECRET_KEY_SIZE>);

impl SecretKey {
    pub(crate) fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        // Clamping
        let mut bytes = bytes;
        bytes[0] &= 248u8;
        bytes[31] &= 127u8;
        bytes[31] |= 64u8;
        SecretKey(Secret::from_bytes(bytes))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        self.0.as_bytes()
    }

    pub fn public_key(&self) -> Result<PublicKey, X25519Error> {
        let secret = x25519_dalek::StaticSecret::from(*self.0.as_bytes());
        let public = x25519_dalek::PublicKey::from(&secret);
        Ok(PublicKey(public.to_bytes()))
    }

    /// Diffie-Hellman agreement between our secret key and the other party's public key.
    ///
    /// Fails when the agreement lands on a low-order point, which would yield a shared secret an
    /// active attacker can force.
    pub fn calculate_agreement(&self, their_public: &PublicKey) -> Result<Vec<u8>, X25519Error> {
        let secret = x25519_dalek::StaticSecret::from(*self.0.as_bytes());
        let public = x25519_dalek::PublicKey::from(their_public.to_bytes());
        let shared_secret = secret.diffie_hellman(&public);
        if !shared_secret.was_contributory() {
            return Err(X25519Error::InvalidCurve);
        }
        Ok(shared_secret.as_bytes().to_vec())
    }
}

/// Public Curve25519 key used for ECDH key agreement.
///
/// Serializes to its tagged encoding (key-type byte followed by the curve point), so decoding
/// material with an unknown type tag fails early instead of being interpreted as a point.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(public_key: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(public_key)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0
    }

    pub fn key_type(&self) -> KeyType {
        KeyType::X25519
    }

    /// Returns the tagged wire encoding of this public key.
    pub fn encode(&self) -> [u8; TAGGED_PUBLIC_KEY_SIZE] {
        let mut bytes = [0u8; TAGGED_PUBLIC_KEY_SIZE];
        bytes[0] = self.key_type().tag();
        bytes[1..].copy_from_slice(&self.0);
        bytes
    }

    /// Decodes a public key from its tagged wire encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, X25519Error> {
        if bytes.len() != TAGGED_PUBLIC_KEY_SIZE {
            return Err(X25519Error::InvalidKeyLength(bytes.len()));
        }
        match KeyType::from_tag(bytes[0])? {
            KeyType::X25519 => {
                let mut key = [0u8; PUBLIC_KEY_SIZE];
                key.copy_from_slice(&bytes[1..]);
                Ok(Self(key))
            }
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_bytes::Bytes::new(&self.encode()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: serde_bytes::ByteBuf = Deserialize::deserialize(deserializer)?;
        PublicKey::decode(&bytes).map_err(D::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum X25519Error {
    #[error("invalid curve point or scalar")]
    InvalidCurve,

    #[error("unknown key type tag {0:#04x}")]
    UnknownKeyType(u8),

    #[error("invalid public key length {0}")]
    InvalidKeyLength(usize),
}
