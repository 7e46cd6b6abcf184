// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::x25519::{PublicKey, SecretKey, TAGGED_PUBLIC_KEY_SIZE, X25519Error};
use crate::crypto::{Rng, RngError};
use crate::keys::KeyError;

/// Agreement keypair holding both halves of an X25519 key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random keypair.
    pub fn generate(rng: &Rng) -> Result<Self, KeyError> {
        let secret_key = SecretKey::from_bytes(rng.random_array()?);
        let public_key = secret_key.public_key()?;
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn calculate_agreement(&self, their_public: &PublicKey) -> Result<Vec<u8>, X25519Error> {
        self.secret_key.calculate_agreement(their_public)
    }
}

/// Public half of a device's long-term identity keypair.
///
/// Exchanged out-of-band and pinned per peer (trust-on-first-use).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityKey(PublicKey);

impl IdentityKey {
    pub fn new(public_key: PublicKey) -> Self {
        Self(public_key)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }

    pub fn encode(&self) -> [u8; TAGGED_PUBLIC_KEY_SIZE] {
        self.0.encode()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, X25519Error> {
        Ok(Self(PublicKey::decode(bytes)?))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device's long-term identity keypair.
///
/// Immutable once generated; rotated only by re-registering the device.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityKeyPair(KeyPair);

impl IdentityKeyPair {
    pub fn generate(rng: &Rng) -> Result<Self, KeyError> {
        Ok(Self(KeyPair::generate(rng)?))
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey(*self.0.public_key())
    }

    pub fn public_key(&self) -> &PublicKey {
        self.0.public_key()
    }

    pub fn secret_key(&self) -> &SecretKey {
        self.0.secret_key()
    }
}

/// Generates the random registration id a device publishes alongside its pre-key bundle.
pub fn generate_registration_id(rng: &Rng) -> Result<u32, RngError> {
    let bytes: [u8; 4] = rng.random_array()?;
    Ok(u32::from_be_bytes(bytes) & 0x3FFF)
}
