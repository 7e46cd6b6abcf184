// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::aead::{AeadError, AeadNonce, aead_decrypt, aead_encrypt};
use crate::crypto::hkdf::{HkdfError, hkdf};
use crate::crypto::x25519::{PublicKey, SecretKey, X25519Error};
use crate::crypto::Secret;

pub const KEY_SIZE: usize = 32;

/// Root key of a session, advanced by one Diffie-Hellman ratchet step at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RootKey(Secret<KEY_SIZE>);

impl RootKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(Secret::from_bytes(bytes))
    }

    /// Mixes a fresh agreement between both parties' current ratchet keys into the root key,
    /// deriving the next root key and the first chain key of a new chain.
    pub(crate) fn create_chain(
        &self,
        their_ratchet_key: &PublicKey,
        our_ratchet_secret: &SecretKey,
    ) -> Result<(RootKey, ChainKey), RatchetError> {
        let agreement = our_ratchet_secret.calculate_agreement(their_ratchet_key)?;
        let okm: [u8; KEY_SIZE * 2] = hkdf(self.0.as_bytes(), &agreement, Some(b"ratchet"))?;

        let mut root = [0u8; KEY_SIZE];
        root.copy_from_slice(&okm[..KEY_SIZE]);
        let mut chain = [0u8; KEY_SIZE];
        chain.copy_from_slice(&okm[KEY_SIZE..]);

        Ok((RootKey::from_bytes(root), ChainKey::from_bytes(chain, 0)))
    }
}

/// Chain key at one position of a sending or receiving chain.
///
/// The index is the counter of the next message keyed by this chain position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainKey {
    key: Secret<KEY_SIZE>,
    index: u32,
}

impl ChainKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE], index: u32) -> Self {
        Self {
            key: Secret::from_bytes(bytes),
            index,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Advances the hash ratchet by one step. The previous chain key is not recoverable from the
    /// result.
    pub(crate) fn next(&self) -> Result<ChainKey, RatchetError> {
        Ok(ChainKey {
            key: Secret::from_bytes(hkdf(b"chain", self.key.as_bytes(), None)?),
            index: self.index + 1,
        })
    }

    /// Derives the message key for this chain position.
    pub(crate) fn message_key(&self) -> Result<MessageKey, RatchetError> {
        Ok(MessageKey {
            seed: Secret::from_bytes(hkdf(b"message", self.key.as_bytes(), None)?),
            counter: self.index,
        })
    }
}

/// Key material for exactly one message.
///
/// The seed keys the AEAD directly, the nonce is derived from it; since every seed is used for a
/// single message this never reuses a (key, nonce) pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageKey {
    seed: Secret<KEY_SIZE>,
    counter: u32,
}

impl MessageKey {
    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub(crate) fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, RatchetError> {
        let nonce: AeadNonce = hkdf(b"nonce", self.seed.as_bytes(), None)?;
        let ciphertext = aead_encrypt(self.seed.as_bytes(), plaintext, nonce, Some(aad))?;
        Ok(ciphertext)
    }

    pub(crate) fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, RatchetError> {
        let nonce: AeadNonce = hkdf(b"nonce", self.seed.as_bytes(), None)?;
        let plaintext = aead_decrypt(self.seed.as_bytes(), ciphertext, nonce, Some(aad))?;
        Ok(plaintext)
    }
}

#[derive(Debug, Error)]
pub enum RatchetError {
    #[error(transparent)]
    Hkdf(#[from] HkdfError),

    #[error(transparent)]
    Aead(#[from] AeadError),

    #[error(transparent)]
    X25519(#[from] X25519Error),
}
