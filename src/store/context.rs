// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::crypto::aead::{AeadNonce, aead_decrypt, aead_encrypt};
use crate::crypto::{Rng, RngError, Secret};
use crate::store::StoreError;

/// Store-level master key for encrypting records at rest.
///
/// The context is created explicitly when the device is unlocked and dropped when it locks again;
/// the key material is zeroised on drop. It is handed to store constructors instead of living in
/// any global state, so its lifecycle is visible in the code that owns it.
///
/// The master key is independent of all protocol keys.
#[derive(Debug)]
pub struct StoreContext {
    master_key: Secret<32>,
}

impl StoreContext {
    /// Creates a context from an existing master key, e.g. one derived from the user's
    /// passphrase at unlock time.
    pub fn unlock(master_key: [u8; 32]) -> Self {
        Self {
            master_key: Secret::from_bytes(master_key),
        }
    }

    /// Creates a context with a freshly generated master key.
    pub fn generate(rng: &Rng) -> Result<Self, RngError> {
        Ok(Self {
            master_key: Secret::from_bytes(rng.random_array()?),
        })
    }

    /// Encrypts a serialized record. The returned blob carries the nonce up front.
    pub(crate) fn seal(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        rng: &Rng,
    ) -> Result<Vec<u8>, StoreError> {
        let nonce: AeadNonce = rng.random_array()?;
        let ciphertext = aead_encrypt(self.master_key.as_bytes(), plaintext, nonce, Some(aad))
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;

        let mut blob = Vec::with_capacity(nonce.len() + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypts a blob produced by [`StoreContext::seal`].
    pub(crate) fn open(&self, blob: &[u8], aad: &[u8]) -> Result<Vec<u8>, StoreError> {
        const NONCE_SIZE: usize = size_of::<AeadNonce>();

        if blob.len() < NONCE_SIZE {
            return Err(StoreError::Corrupt("blob too short for nonce".into()));
        }

        let mut nonce: AeadNonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&blob[..NONCE_SIZE]);

        aead_decrypt(self.master_key.as_bytes(), &blob[NONCE_SIZE..], nonce, Some(aad))
            .map_err(|err| StoreError::Corrupt(err.to_string()))
    }
}
