// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::x25519::PublicKey;
use crate::crypto::xeddsa::{XEdDSAError, XSignature, xeddsa_verify};
use crate::keys::identity::IdentityKey;
use crate::keys::prekey::{PreKeyId, SignedPreKeyId};

/// Public key material a device publishes so peers can initiate a session with it while it is
/// offline.
///
/// Contains the device identity key, the current signed pre-key with its identity-key signature
/// and optionally one one-time pre-key. A directory service hands out each one-time pre-key at
/// most once; when a device runs out, bundles are served without one and the handshake falls back
/// to the reduced agreement set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreKeyBundle {
    registration_id: u32,
    identity_key: IdentityKey,
    signed_prekey_id: SignedPreKeyId,
    signed_prekey: PublicKey,
    signed_prekey_signature: XSignature,
    onetime_prekey_id: Option<PreKeyId>,
    onetime_prekey: Option<PublicKey>,
}

impl PreKeyBundle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registration_id: u32,
        identity_key: IdentityKey,
        signed_prekey_id: SignedPreKeyId,
        signed_prekey: PublicKey,
        signed_prekey_signature: XSignature,
        onetime_prekey_id: Option<PreKeyId>,
        onetime_prekey: Option<PublicKey>,
    ) -> Self {
        Self {
            registration_id,
            identity_key,
            signed_prekey_id,
            signed_prekey,
            signed_prekey_signature,
            onetime_prekey_id,
            onetime_prekey,
        }
    }

    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    pub fn signed_prekey_id(&self) -> SignedPreKeyId {
        self.signed_prekey_id
    }

    pub fn signed_prekey(&self) -> &PublicKey {
        &self.signed_prekey
    }

    pub fn onetime_prekey_id(&self) -> Option<PreKeyId> {
        self.onetime_prekey_id
    }

    pub fn onetime_prekey(&self) -> Option<&PublicKey> {
        self.onetime_prekey.as_ref()
    }

    /// Checks the identity-key signature over the signed pre-key.
    ///
    /// Initiators call this before deriving any secrets from the bundle.
    pub fn verify(&self) -> Result<(), PreKeyBundleError> {
        xeddsa_verify(
            &self.signed_prekey.encode(),
            self.identity_key.public_key(),
            &self.signed_prekey_signature,
        )?;

        // A one-time pre-key is only meaningful together with its id.
        if self.onetime_prekey.is_some() != self.onetime_prekey_id.is_some() {
            return Err(PreKeyBundleError::MalformedOneTimePreKey);
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PreKeyBundleError {
    #[error(transparent)]
    XEdDSA(#[from] XEdDSAError),

    #[error("bundle carries a one-time pre-key without an id (or the reverse)")]
    MalformedOneTimePreKey,
}
