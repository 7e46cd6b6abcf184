// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage seams for key material, pinned identities and session records.
//!
//! The cryptographic core never persists anything itself; it operates on values handed to it and
//! returns the mutated values. These traits are the seams where applications plug in their own
//! persistence. In-memory implementations are provided for tests and as reference; they guard
//! their maps with mutexes so a load racing a removal never observes torn state.
//!
//! Session records are encrypted at rest under a store-level master key (see [`StoreContext`])
//! which is independent of the protocol's own keys: compromise of the on-disk encryption key does
//! not expose protocol key material structure beyond what serialization reveals, and vice versa.
mod cleanup;
mod context;
mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cleanup::{SIGNED_PREKEY_ARCHIVE_AGE_SECS, cleanup_signed_prekeys};
pub use context::StoreContext;
pub use memory::{
    MemoryIdentityStore, MemoryPreKeyStore, MemorySessionStore, MemorySignedPreKeyStore,
};

use crate::cbor::{DecodeError, EncodeError};
use crate::crypto::RngError;
use crate::keys::{
    IdentityKey, IdentityKeyPair, PreKeyId, PreKeyRecord, SignedPreKeyId, SignedPreKeyRecord,
};
use crate::ratchet::SessionRecord;

/// One device of a peer. Sessions, pinned identities and queued messages are all keyed by this.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    name: String,
    device_id: u32,
}

impl Address {
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self {
            name: name.into(),
            device_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

/// Lifecycle manager for one-time pre-keys.
pub trait PreKeyStore {
    fn load(&self, id: PreKeyId) -> Result<Option<PreKeyRecord>, StoreError>;

    fn store(&self, record: PreKeyRecord) -> Result<(), StoreError>;

    fn contains(&self, id: PreKeyId) -> Result<bool, StoreError>;

    fn remove(&self, id: PreKeyId) -> Result<(), StoreError>;
}

/// Lifecycle manager for signed pre-keys.
pub trait SignedPreKeyStore {
    fn load(&self, id: SignedPreKeyId) -> Result<Option<SignedPreKeyRecord>, StoreError>;

    fn load_all(&self) -> Result<Vec<SignedPreKeyRecord>, StoreError>;

    fn store(&self, record: SignedPreKeyRecord) -> Result<(), StoreError>;

    fn contains(&self, id: SignedPreKeyId) -> Result<bool, StoreError>;

    fn remove(&self, id: SignedPreKeyId) -> Result<(), StoreError>;
}

/// Holds our own identity keypair and the identity keys pinned per peer device.
pub trait IdentityStore {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair, StoreError>;

    fn local_registration_id(&self) -> Result<u32, StoreError>;

    /// Returns the pinned identity key for this address, if any.
    fn identity(&self, address: &Address) -> Result<Option<IdentityKey>, StoreError>;

    /// True when no identity is pinned for this address yet (trust on first use) or the pinned
    /// identity matches.
    fn is_trusted_identity(
        &self,
        address: &Address,
        identity: &IdentityKey,
    ) -> Result<bool, StoreError>;

    /// Pins `identity` for this address, replacing any previous pin. Returns true when an
    /// existing pin was replaced.
    fn save_identity(
        &self,
        address: &Address,
        identity: &IdentityKey,
    ) -> Result<bool, StoreError>;
}

/// Encrypted-at-rest persistence of session records, keyed by peer device.
///
/// All load/modify/store sequences for one address form a critical section; see
/// [`SessionManager`](crate::SessionManager).
pub trait SessionStore {
    /// Returns the stored record, or an empty record when none exists. "No session" is a valid
    /// initial state, not a failure.
    fn load_session(&self, address: &Address) -> Result<SessionRecord, StoreError>;

    fn store_session(&self, address: &Address, record: &SessionRecord) -> Result<(), StoreError>;

    /// True only when a session exists and is usable, i.e. has completed at least one chain and
    /// is not merely a stub.
    fn contains_session(&self, address: &Address) -> Result<bool, StoreError>;

    fn delete_session(&self, address: &Address) -> Result<(), StoreError>;

    /// Deletes the sessions of every device of this peer.
    fn delete_all_sessions(&self, name: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock is poisoned")]
    LockPoisoned,

    #[error("persisted session record has unknown version marker {0}")]
    UnsupportedVersion(u32),

    #[error("persisted session record is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
