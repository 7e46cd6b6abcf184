// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ciphertext envelope sent over the network.
//!
//! Note that this does not contain any addressing information about sender and receiver. This
//! information needs to be added by the transport layer.
use serde::{Deserialize, Serialize};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::crypto::x25519::PublicKey;
use crate::keys::{IdentityKey, PreKeyId, SignedPreKeyId};

/// Current envelope wire version. Anything lower fails as legacy, anything higher as unsupported.
pub const CIPHERTEXT_VERSION: u8 = 3;

/// One encrypted message together with the ratchet metadata the receiver needs to resolve its
/// message key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    version: u8,
    ratchet_key: PublicKey,
    counter: u32,
    previous_counter: u32,
    #[serde(with = "serde_bytes")]
    ciphertext: Vec<u8>,
    /// Present only on messages sent before the responder has confirmed the handshake, so the
    /// receiver can complete its half of the session from the very first message.
    pending: Option<PendingHandshake>,
}

impl Envelope {
    pub(crate) fn new(
        version: u8,
        ratchet_key: PublicKey,
        counter: u32,
        previous_counter: u32,
        ciphertext: Vec<u8>,
        pending: Option<PendingHandshake>,
    ) -> Self {
        Self {
            version,
            ratchet_key,
            counter,
            previous_counter,
            ciphertext,
            pending,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn ratchet_key(&self) -> &PublicKey {
        &self.ratchet_key
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn pending(&self) -> Option<&PendingHandshake> {
        self.pending.as_ref()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}

/// Handshake block referencing the pre-key bundle the initiator consumed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingHandshake {
    registration_id: u32,
    signed_prekey_id: SignedPreKeyId,
    onetime_prekey_id: Option<PreKeyId>,
    base_key: PublicKey,
    identity_key: IdentityKey,
}

impl PendingHandshake {
    pub(crate) fn new(
        registration_id: u32,
        signed_prekey_id: SignedPreKeyId,
        onetime_prekey_id: Option<PreKeyId>,
        base_key: PublicKey,
        identity_key: IdentityKey,
    ) -> Self {
        Self {
            registration_id,
            signed_prekey_id,
            onetime_prekey_id,
            base_key,
            identity_key,
        }
    }

    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    pub fn signed_prekey_id(&self) -> SignedPreKeyId {
        self.signed_prekey_id
    }

    pub fn onetime_prekey_id(&self) -> Option<PreKeyId> {
        self.onetime_prekey_id
    }

    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }
}
