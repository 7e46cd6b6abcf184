// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::crypto::Rng;
use crate::keys::{
    IdentityKey, IdentityKeyPair, PreKeyId, PreKeyRecord, SignedPreKeyId, SignedPreKeyRecord,
};
use crate::ratchet::{SESSION_RECORD_VERSION, SessionRecord};
use crate::store::{
    Address, IdentityStore, PreKeyStore, SessionStore, SignedPreKeyStore, StoreContext, StoreError,
};

/// In-memory one-time pre-key store.
#[derive(Debug, Default)]
pub struct MemoryPreKeyStore {
    records: Mutex<HashMap<PreKeyId, PreKeyRecord>>,
}

impl PreKeyStore for MemoryPreKeyStore {
    fn load(&self, id: PreKeyId) -> Result<Option<PreKeyRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.get(&id).cloned())
    }

    fn store(&self, record: PreKeyRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        records.insert(record.id(), record);
        Ok(())
    }

    fn contains(&self, id: PreKeyId) -> Result<bool, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.contains_key(&id))
    }

    fn remove(&self, id: PreKeyId) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        records.remove(&id);
        Ok(())
    }
}

/// In-memory signed pre-key store.
#[derive(Debug, Default)]
pub struct MemorySignedPreKeyStore {
    records: Mutex<HashMap<SignedPreKeyId, SignedPreKeyRecord>>,
}

impl SignedPreKeyStore for MemorySignedPreKeyStore {
    fn load(&self, id: SignedPreKeyId) -> Result<Option<SignedPreKeyRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.get(&id).cloned())
    }

    fn load_all(&self) -> Result<Vec<SignedPreKeyRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.values().cloned().collect())
    }

    fn store(&self, record: SignedPreKeyRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        records.insert(record.id(), record);
        Ok(())
    }

    fn contains(&self, id: SignedPreKeyId) -> Result<bool, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.contains_key(&id))
    }

    fn remove(&self, id: SignedPreKeyId) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        records.remove(&id);
        Ok(())
    }
}

/// In-memory identity store holding our own keypair and the identities pinned per peer device.
#[derive(Debug)]
pub struct MemoryIdentityStore {
    identity: IdentityKeyPair,
    registration_id: u32,
    pinned: Mutex<HashMap<Address, IdentityKey>>,
}

impl MemoryIdentityStore {
    pub fn new(identity: IdentityKeyPair, registration_id: u32) -> Self {
        Self {
            identity,
            registration_id,
            pinned: Mutex::new(HashMap::new()),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair, StoreError> {
        Ok(self.identity.clone())
    }

    fn local_registration_id(&self) -> Result<u32, StoreError> {
        Ok(self.registration_id)
    }

    fn identity(&self, address: &Address) -> Result<Option<IdentityKey>, StoreError> {
        let pinned = self.pinned.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(pinned.get(address).copied())
    }

    fn is_trusted_identity(
        &self,
        address: &Address,
        identity: &IdentityKey,
    ) -> Result<bool, StoreError> {
        let pinned = self.pinned.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(match pinned.get(address) {
            // Trust on first use.
            None => true,
            Some(pinned_identity) => pinned_identity == identity,
        })
    }

    fn save_identity(
        &self,
        address: &Address,
        identity: &IdentityKey,
    ) -> Result<bool, StoreError> {
        let mut pinned = self.pinned.lock().map_err(|_| StoreError::LockPoisoned)?;
        let previous = pinned.insert(address.clone(), *identity);
        Ok(previous.is_some_and(|previous_identity| &previous_identity != identity))
    }
}

/// In-memory session store which keeps records encrypted at rest.
///
/// Every persisted record is laid out as `{version marker, u32 LE}{nonce}{aead ciphertext}`. An
/// unknown version marker is rejected as a hard failure instead of guessing a schema.
#[derive(Debug)]
pub struct MemorySessionStore {
    context: StoreContext,
    rng: Rng,
    sessions: Mutex<HashMap<Address, Vec<u8>>>,
}

impl MemorySessionStore {
    pub fn new(context: StoreContext) -> Self {
        Self {
            context,
            rng: Rng::default(),
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load_session(&self, address: &Address) -> Result<SessionRecord, StoreError> {
        let sessions = self.sessions.lock().map_err(|_| StoreError::LockPoisoned)?;

        let Some(blob) = sessions.get(address) else {
            debug!(%address, "no existing session record, starting fresh");
            return Ok(SessionRecord::new());
        };

        if blob.len() < 4 {
            return Err(StoreError::Corrupt("blob too short for version marker".into()));
        }
        let version_marker = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]);
        if version_marker != SESSION_RECORD_VERSION {
            return Err(StoreError::UnsupportedVersion(version_marker));
        }

        let serialized = self
            .context
            .open(&blob[4..], address.to_string().as_bytes())?;
        Ok(SessionRecord::from_bytes(&serialized)?)
    }

    fn store_session(&self, address: &Address, record: &SessionRecord) -> Result<(), StoreError> {
        let serialized = record.to_bytes()?;
        let sealed = self
            .context
            .seal(&serialized, address.to_string().as_bytes(), &self.rng)?;

        let mut blob = Vec::with_capacity(4 + sealed.len());
        blob.extend_from_slice(&SESSION_RECORD_VERSION.to_le_bytes());
        blob.extend_from_slice(&sealed);

        let mut sessions = self.sessions.lock().map_err(|_| StoreError::LockPoisoned)?;
        sessions.insert(address.clone(), blob);
        Ok(())
    }

    fn contains_session(&self, address: &Address) -> Result<bool, StoreError> {
        {
            let sessions = self.sessions.lock().map_err(|_| StoreError::LockPoisoned)?;
            if !sessions.contains_key(address) {
                return Ok(false);
            }
        }
        Ok(self.load_session(address)?.has_usable_session())
    }

    fn delete_session(&self, address: &Address) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| StoreError::LockPoisoned)?;
        sessions.remove(address);
        Ok(())
    }

    fn delete_all_sessions(&self, name: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| StoreError::LockPoisoned)?;
        sessions.retain(|address, _| address.name() != name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;
    use crate::keys::{IdentityKeyPair, PreKeyRecord};
    use crate::ratchet::SessionRecord;
    use crate::store::{
        Address, IdentityStore, PreKeyStore, SessionStore, StoreContext, StoreError,
    };

    use super::{MemoryIdentityStore, MemoryPreKeyStore, MemorySessionStore};

    #[test]
    fn prekey_store_consumes_exactly_once() {
        let rng = Rng::from_seed([1; 32]);
        let store = MemoryPreKeyStore::default();

        let record = PreKeyRecord::generate(7, &rng).unwrap();
        store.store(record).unwrap();
        assert!(store.contains(7).unwrap());

        assert!(store.load(7).unwrap().is_some());
        store.remove(7).unwrap();

        assert!(!store.contains(7).unwrap());
        assert!(store.load(7).unwrap().is_none());
    }

    #[test]
    fn identity_pinning_is_trust_on_first_use() {
        let rng = Rng::from_seed([1; 32]);
        let our_identity = IdentityKeyPair::generate(&rng).unwrap();
        let store = MemoryIdentityStore::new(our_identity, 42);

        let address = Address::new("alice", 1);
        let identity_1 = IdentityKeyPair::generate(&rng).unwrap().identity_key();
        let identity_2 = IdentityKeyPair::generate(&rng).unwrap().identity_key();

        // Unknown peer: anything is trusted.
        assert!(store.is_trusted_identity(&address, &identity_1).unwrap());
        assert!(store.identity(&address).unwrap().is_none());

        // After pinning, only the pinned identity is trusted.
        assert!(!store.save_identity(&address, &identity_1).unwrap());
        assert!(store.is_trusted_identity(&address, &identity_1).unwrap());
        assert!(!store.is_trusted_identity(&address, &identity_2).unwrap());

        // Replacing the pin is reported.
        assert!(store.save_identity(&address, &identity_2).unwrap());
        assert!(store.is_trusted_identity(&address, &identity_2).unwrap());
    }

    #[test]
    fn missing_session_loads_as_fresh_record() {
        let rng = Rng::from_seed([1; 32]);
        let store = MemorySessionStore::new(StoreContext::generate(&rng).unwrap());

        let address = Address::new("alice", 1);
        let record = store.load_session(&address).unwrap();
        assert!(record.is_fresh());
        assert!(!store.contains_session(&address).unwrap());
    }

    #[test]
    fn stored_sessions_are_opaque_at_rest() {
        let rng = Rng::from_seed([1; 32]);
        let store = MemorySessionStore::new(StoreContext::generate(&rng).unwrap());

        let address = Address::new("alice", 1);
        let record = SessionRecord::new();
        store.store_session(&address, &record).unwrap();

        let serialized = record.to_bytes().unwrap();
        let blob = {
            let sessions = store.sessions.lock().unwrap();
            sessions.get(&address).unwrap().clone()
        };

        // The plaintext serialization never appears in the persisted blob.
        assert!(
            !blob
                .windows(serialized.len())
                .any(|window| window == serialized)
        );

        // Two stores of the same record produce different blobs (fresh nonce each time).
        store.store_session(&address, &record).unwrap();
        let blob_again = {
            let sessions = store.sessions.lock().unwrap();
            sessions.get(&address).unwrap().clone()
        };
        assert_ne!(blob, blob_again);
    }

    #[test]
    fn unknown_version_marker_is_a_hard_failure() {
        let rng = Rng::from_seed([1; 32]);
        let store = MemorySessionStore::new(StoreContext::generate(&rng).unwrap());

        let address = Address::new("alice", 1);
        store
            .store_session(&address, &SessionRecord::new())
            .unwrap();

        {
            let mut sessions = store.sessions.lock().unwrap();
            let blob = sessions.get_mut(&address).unwrap();
            blob[..4].copy_from_slice(&99u32.to_le_bytes());
        }

        assert!(matches!(
            store.load_session(&address),
            Err(StoreError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn delete_all_sessions_only_hits_the_named_peer() {
        let rng = Rng::from_seed([1; 32]);
        let store = MemorySessionStore::new(StoreContext::generate(&rng).unwrap());

        for address in [
            Address::new("alice", 1),
            Address::new("alice", 2),
            Address::new("bob", 1),
        ] {
            store
                .store_session(&address, &SessionRecord::new())
                .unwrap();
        }

        store.delete_all_sessions("alice").unwrap();

        let sessions = store.sessions.lock().unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions.contains_key(&Address::new("bob", 1)));
    }
}
