// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestration of stores, builder and cipher with the locking the engine requires.
//!
//! The manager owns the load→mutate→persist cycle: every encrypt and decrypt loads the session
//! record, runs the pure cryptographic transform and persists the result before returning. A
//! failed operation persists nothing, which keeps the stored record byte-for-byte as it was and
//! makes retries with corrected input possible.
//!
//! A single coarse mutex serializes these cycles. Encrypt and decrypt against the same session
//! must never interleave since both mutate shared chain state; distinct peer devices are logically
//! independent, so integrators with high contention can shard the manager per peer instead.
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::crypto::Rng;
use crate::keys::{IdentityKey, PreKeyBundle};
use crate::message::Envelope;
use crate::session::{SessionBuilder, SessionCipher, SessionError};
use crate::store::{
    Address, IdentityStore, PreKeyStore, SessionStore, SignedPreKeyStore, StoreError,
};

/// Session engine entry point for one local device.
///
/// Wires the [`SessionBuilder`] and [`SessionCipher`] to the device's stores, pins peer
/// identities on first use and consumes one-time pre-keys once a handshake fully succeeded.
#[derive(Debug)]
pub struct SessionManager<S, P, SP, I> {
    session_store: S,
    prekey_store: P,
    signed_prekey_store: SP,
    identity_store: I,
    rng: Rng,
    lock: Mutex<()>,
}

impl<S, P, SP, I> SessionManager<S, P, SP, I>
where
    S: SessionStore,
    P: PreKeyStore,
    SP: SignedPreKeyStore,
    I: IdentityStore,
{
    pub fn new(
        session_store: S,
        prekey_store: P,
        signed_prekey_store: SP,
        identity_store: I,
        rng: Rng,
    ) -> Self {
        Self {
            session_store,
            prekey_store,
            signed_prekey_store,
            identity_store,
            rng,
            lock: Mutex::new(()),
        }
    }

    /// Establishes an outgoing session from the peer's published pre-key bundle.
    ///
    /// The bundle's identity key is compared against the pinned identity for this address first;
    /// a mismatch fails with [`SessionError::UntrustedIdentity`] and is never resolved
    /// automatically, see [`SessionManager::trust_identity`].
    pub fn process_bundle(
        &self,
        address: &Address,
        bundle: &PreKeyBundle,
    ) -> Result<(), SessionError> {
        let _guard = self.guard()?;

        if !self
            .identity_store
            .is_trusted_identity(address, bundle.identity_key())?
        {
            return Err(SessionError::UntrustedIdentity);
        }

        let our_identity = self.identity_store.identity_key_pair()?;
        let our_registration_id = self.identity_store.local_registration_id()?;

        let record = self.session_store.load_session(address)?;
        let record =
            SessionBuilder::initiate(record, &our_identity, our_registration_id, bundle, &self.rng)?;
        self.session_store.store_session(address, &record)?;

        if self.identity_store.identity(address)?.is_none() {
            self.identity_store
                .save_identity(address, bundle.identity_key())?;
        }

        debug!(%address, "established outgoing session");
        Ok(())
    }

    /// Encrypts a plaintext for the peer, returning envelope bytes ready to hand to the outbound
    /// transport.
    pub fn encrypt(&self, address: &Address, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        let _guard = self.guard()?;

        let record = self.session_store.load_session(address)?;
        let (record, envelope) = SessionCipher::encrypt(record, plaintext, &self.rng)?;
        self.session_store.store_session(address, &record)?;

        Ok(envelope.to_bytes()?)
    }

    /// Decrypts envelope bytes received from the peer. This is the surface the message-delivery
    /// layer calls for every queued envelope it fetched.
    ///
    /// Handshake envelopes complete the responder half of the session first; the referenced
    /// one-time pre-key is deleted only after the decrypt fully succeeded and the record is
    /// persisted.
    pub fn decrypt(&self, address: &Address, envelope_bytes: &[u8]) -> Result<Vec<u8>, SessionError> {
        let _guard = self.guard()?;

        let envelope = Envelope::from_bytes(envelope_bytes)?;
        let mut record = self.session_store.load_session(address)?;
        let mut consumed_prekey = None;

        if let Some(handshake) = envelope.pending() {
            if !self
                .identity_store
                .is_trusted_identity(address, handshake.identity_key())?
            {
                return Err(SessionError::UntrustedIdentity);
            }

            let our_identity = self.identity_store.identity_key_pair()?;
            let our_registration_id = self.identity_store.local_registration_id()?;

            let (responded, consumed) = SessionBuilder::respond(
                record,
                &our_identity,
                our_registration_id,
                &self.prekey_store,
                &self.signed_prekey_store,
                handshake,
            )?;
            record = responded;
            consumed_prekey = consumed;
        }

        let (record, plaintext) = SessionCipher::decrypt(record, &envelope)?;
        self.session_store.store_session(address, &record)?;

        if let Some(id) = consumed_prekey {
            self.prekey_store.remove(id)?;
            debug!(%address, id, "consumed one-time pre-key");
        }

        if self.identity_store.identity(address)?.is_none() {
            if let Some(state) = record.session_state() {
                self.identity_store
                    .save_identity(address, state.remote_identity())?;
            }
        }

        Ok(plaintext)
    }

    /// True only when a usable session exists for this address, i.e. the handshake completed at
    /// least one chain.
    pub fn contains_session(&self, address: &Address) -> Result<bool, SessionError> {
        Ok(self.session_store.contains_session(address)?)
    }

    pub fn delete_session(&self, address: &Address) -> Result<(), SessionError> {
        let _guard = self.guard()?;
        Ok(self.session_store.delete_session(address)?)
    }

    pub fn delete_all_sessions(&self, name: &str) -> Result<(), SessionError> {
        let _guard = self.guard()?;
        Ok(self.session_store.delete_all_sessions(name)?)
    }

    /// Explicit caller-driven decision to trust a changed identity key for this peer device.
    ///
    /// This is the only way an existing pin gets replaced.
    pub fn trust_identity(
        &self,
        address: &Address,
        identity: &IdentityKey,
    ) -> Result<(), SessionError> {
        let _guard = self.guard()?;
        let replaced = self.identity_store.save_identity(address, identity)?;
        if replaced {
            warn!(%address, "replaced pinned identity after explicit caller decision");
        }
        Ok(())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, SessionError> {
        self.lock
            .lock()
            .map_err(|_| SessionError::Store(StoreError::LockPoisoned))
    }
}
