// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::crypto::Rng;
use crate::crypto::xeddsa::{XSignature, xeddsa_sign};
use crate::keys::KeyError;
use crate::keys::identity::{IdentityKeyPair, KeyPair};

/// Unique identifier of a one-time pre-key.
pub type PreKeyId = u32;

/// Unique identifier of a signed pre-key.
pub type SignedPreKeyId = u32;

/// One-time agreement key, consumed by at most one incoming handshake and deleted afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreKeyRecord {
    id: PreKeyId,
    key_pair: KeyPair,
}

impl PreKeyRecord {
    pub fn generate(id: PreKeyId, rng: &Rng) -> Result<Self, KeyError> {
        Ok(Self {
            id,
            key_pair: KeyPair::generate(rng)?,
        })
    }

    pub fn id(&self) -> PreKeyId {
        self.id
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

/// Medium-lived agreement key whose authenticity is proven by a signature from the owner's
/// identity key.
///
/// Rotated periodically; superseded records stay around for a grace window so messages encrypted
/// against an older bundle can still complete their handshake.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    id: SignedPreKeyId,
    key_pair: KeyPair,
    signature: XSignature,
    timestamp: u64,
}

impl SignedPreKeyRecord {
    /// Generates a new signed pre-key, signing its public key with the device identity.
    ///
    /// The `timestamp` (seconds since the UNIX epoch) is recorded for the rotation and retention
    /// logic, see [`cleanup_signed_prekeys`](crate::store::cleanup_signed_prekeys).
    pub fn generate(
        identity: &IdentityKeyPair,
        id: SignedPreKeyId,
        timestamp: u64,
        rng: &Rng,
    ) -> Result<Self, KeyError> {
        let key_pair = KeyPair::generate(rng)?;
        let signature = xeddsa_sign(&key_pair.public_key().encode(), identity.secret_key(), rng)?;
        Ok(Self {
            id,
            key_pair,
            signature,
            timestamp,
        })
    }

    pub fn id(&self) -> SignedPreKeyId {
        self.id
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn signature(&self) -> &XSignature {
        &self.signature
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Generates a batch of one-time pre-keys with consecutive ids.
///
/// Ids wrap around the medium value range so replenishing batches never collide with ids still
/// referenced by in-flight handshakes.
pub fn generate_prekeys(
    start: PreKeyId,
    count: u32,
    rng: &Rng,
) -> Result<Vec<PreKeyRecord>, KeyError> {
    const MEDIUM_MAX_VALUE: u32 = 0x00FF_FFFF;

    let mut records = Vec::with_capacity(count as usize);
    for i in 0..count {
        let id = ((start.wrapping_add(i).wrapping_sub(1)) % (MEDIUM_MAX_VALUE - 1)) + 1;
        records.push(PreKeyRecord::generate(id, rng)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;
    use crate::crypto::xeddsa::xeddsa_verify;
    use crate::keys::IdentityKeyPair;

    use super::{SignedPreKeyRecord, generate_prekeys};

    #[test]
    fn signed_prekey_signature_verifies() {
        let rng = Rng::from_seed([1; 32]);

        let identity = IdentityKeyPair::generate(&rng).unwrap();
        let record = SignedPreKeyRecord::generate(&identity, 1, 1_700_000_000, &rng).unwrap();

        assert!(
            xeddsa_verify(
                &record.key_pair().public_key().encode(),
                identity.public_key(),
                record.signature(),
            )
            .is_ok()
        );
        assert_eq!(record.timestamp(), 1_700_000_000);
    }

    #[test]
    fn prekey_batch_ids_are_consecutive() {
        let rng = Rng::from_seed([1; 32]);

        let records = generate_prekeys(100, 10, &rng).unwrap();
        let ids: Vec<u32> = records.iter().map(|record| record.id()).collect();
        assert_eq!(ids, (100..110).collect::<Vec<u32>>());

        // Keys are unique.
        for window in records.windows(2) {
            assert_ne!(
                window[0].key_pair().public_key(),
                window[1].key_pair().public_key()
            );
        }
    }

    #[test]
    fn prekey_batch_ids_wrap() {
        let rng = Rng::from_seed([1; 32]);

        let records = generate_prekeys(0x00FF_FFFE, 3, &rng).unwrap();
        let ids: Vec<u32> = records.iter().map(|record| record.id()).collect();
        // Id zero is never produced, the range restarts at one.
        assert_eq!(ids, vec![0x00FF_FFFE, 1, 2]);
    }
}
