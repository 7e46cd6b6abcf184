// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto::x25519::PublicKey;
use crate::keys::{IdentityKey, KeyPair, PreKeyId, SignedPreKeyId};
use crate::ratchet::keys::{ChainKey, MessageKey, RootKey};

/// Version of the session state layout, recorded at establishment time.
pub const SESSION_VERSION: u32 = 3;

/// Bound on receiving chains kept per session state. The oldest chain is evicted beyond this, so
/// messages arriving for ratchet keys superseded more than this many steps ago can no longer be
/// decrypted.
pub const MAX_RECEIVER_CHAINS: usize = 5;

/// Bound on cached skipped message keys per receiving chain, which is also the furthest forward
/// jump a single message may require. A sender further out of order than this is not supported.
pub const MAX_SKIPPED_MESSAGE_KEYS: usize = 2000;

/// The sending chain of a session state.
///
/// There is at most one; a ratchet step triggered by the peer's new ratchet key retires it and a
/// fresh chain is derived on the next local encrypt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SenderChain {
    chain_key: ChainKey,
}

impl SenderChain {
    pub(crate) fn new(chain_key: ChainKey) -> Self {
        Self { chain_key }
    }

    pub(crate) fn chain_key(&self) -> &ChainKey {
        &self.chain_key
    }

    pub(crate) fn set_chain_key(&mut self, chain_key: ChainKey) {
        self.chain_key = chain_key;
    }
}

/// One receiving chain, keyed by the ratchet public key the peer sent under.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReceiverChain {
    ratchet_key: PublicKey,
    chain_key: ChainKey,
    skipped_message_keys: HashMap<u32, MessageKey>,
}

impl ReceiverChain {
    pub(crate) fn new(ratchet_key: PublicKey, chain_key: ChainKey) -> Self {
        Self {
            ratchet_key,
            chain_key,
            skipped_message_keys: HashMap::new(),
        }
    }

    pub fn ratchet_key(&self) -> &PublicKey {
        &self.ratchet_key
    }

    pub(crate) fn chain_key(&self) -> &ChainKey {
        &self.chain_key
    }

    pub(crate) fn set_chain_key(&mut self, chain_key: ChainKey) {
        self.chain_key = chain_key;
    }

    /// Number of cached skipped message keys on this chain.
    pub fn skipped_message_key_count(&self) -> usize {
        self.skipped_message_keys.len()
    }

    /// Caches a message key which was derived but not consumed because its message has not
    /// arrived yet. The cache is bounded; the key furthest in the past is dropped beyond that,
    /// giving up on its message ever arriving.
    pub(crate) fn cache_skipped_message_key(&mut self, message_key: MessageKey) {
        self.skipped_message_keys
            .insert(message_key.counter(), message_key);

        if self.skipped_message_keys.len() > MAX_SKIPPED_MESSAGE_KEYS {
            if let Some(oldest) = self.skipped_message_keys.keys().min().copied() {
                self.skipped_message_keys.remove(&oldest);
            }
        }
    }

    /// Removes and returns the cached message key for this counter. Each key can be taken exactly
    /// once; asking again for the same counter is how a replay surfaces.
    pub(crate) fn take_skipped_message_key(&mut self, counter: u32) -> Option<MessageKey> {
        self.skipped_message_keys.remove(&counter)
    }
}

/// Reference to the pre-keys consumed during session initiation.
///
/// Carried on every outgoing message until the peer's first reply proves the handshake completed,
/// so the peer can complete its half from any one of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPreKey {
    signed_prekey_id: SignedPreKeyId,
    onetime_prekey_id: Option<PreKeyId>,
    base_key: PublicKey,
}

impl PendingPreKey {
    pub(crate) fn new(
        signed_prekey_id: SignedPreKeyId,
        onetime_prekey_id: Option<PreKeyId>,
        base_key: PublicKey,
    ) -> Self {
        Self {
            signed_prekey_id,
            onetime_prekey_id,
            base_key,
        }
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
}

/// Ratcheting chain-cipher state for one peer-device pair.
///
/// Mutated on every encrypt (advances the sending chain) and every decrypt (may insert a new
/// receiving chain on a ratchet-key change). Holds at most one sending chain and a bounded number
/// of receiving chains.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    session_version: u32,
    local_identity: IdentityKey,
    remote_identity: IdentityKey,
    /// Our registration id, repeated in the pending-handshake block of outgoing messages.
    local_registration_id: u32,
    root_key: RootKey,
    /// Our current ratchet keypair. Kept outside the sending chain since the receiving side of a
    /// ratchet step needs it even while no sending chain exists.
    local_ratchet_key: KeyPair,
    sender_chain: Option<SenderChain>,
    receiver_chains: Vec<ReceiverChain>,
    previous_counter: u32,
    pending_prekey: Option<PendingPreKey>,
    /// The initiator's ephemeral base key. Lets a replayed or delayed handshake message find the
    /// session it already established instead of building a second one.
    handshake_base_key: PublicKey,
}

impl SessionState {
    pub(crate) fn new(
        local_identity: IdentityKey,
        remote_identity: IdentityKey,
        local_registration_id: u32,
        root_key: RootKey,
        local_ratchet_key: KeyPair,
        handshake_base_key: PublicKey,
    ) -> Self {
        Self {
            session_version: SESSION_VERSION,
            local_identity,
            remote_identity,
            local_registration_id,
            root_key,
            local_ratchet_key,
            sender_chain: None,
            receiver_chains: Vec::new(),
            previous_counter: 0,
            pending_prekey: None,
            handshake_base_key,
        }
    }

    pub fn session_version(&self) -> u32 {
        self.session_version
    }

    pub fn local_identity(&self) -> &IdentityKey {
        &self.local_identity
    }

    pub fn remote_identity(&self) -> &IdentityKey {
        &self.remote_identity
    }

    pub fn local_registration_id(&self) -> u32 {
        self.local_registration_id
    }

    pub(crate) fn root_key(&self) -> &RootKey {
        &self.root_key
    }

    pub(crate) fn set_root_key(&mut self, root_key: RootKey) {
        self.root_key = root_key;
    }

    pub(crate) fn local_ratchet_key(&self) -> &KeyPair {
        &self.local_ratchet_key
    }

    pub(crate) fn set_local_ratchet_key(&mut self, key_pair: KeyPair) {
        self.local_ratchet_key = key_pair;
    }

    pub fn has_sender_chain(&self) -> bool {
        self.sender_chain.is_some()
    }

    pub(crate) fn sender_chain(&self) -> Option<&SenderChain> {
        self.sender_chain.as_ref()
    }

    pub(crate) fn sender_chain_mut(&mut self) -> Option<&mut SenderChain> {
        self.sender_chain.as_mut()
    }

    pub(crate) fn set_sender_chain(&mut self, chain: SenderChain) {
        self.sender_chain = Some(chain);
    }

    /// Retires the sending chain after a ratchet step. Its length is recorded so the peer can
    /// collect message keys for anything still in flight on it.
    pub(crate) fn retire_sender_chain(&mut self) {
        if let Some(chain) = self.sender_chain.take() {
            self.previous_counter = chain.chain_key().index();
        }
    }

    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    /// True once the handshake-derived state has processed at least one chain, i.e. the session
    /// is more than a stub.
    pub fn has_ratcheted(&self) -> bool {
        self.sender_chain.is_some() || !self.receiver_chains.is_empty()
    }

    pub(crate) fn receiver_chain_mut(&mut self, ratchet_key: &PublicKey) -> Option<&mut ReceiverChain> {
        self.receiver_chains
            .iter_mut()
            .find(|chain| chain.ratchet_key() == ratchet_key)
    }

    pub(crate) fn has_receiver_chain(&self, ratchet_key: &PublicKey) -> bool {
        self.receiver_chains
            .iter()
            .any(|chain| chain.ratchet_key() == ratchet_key)
    }

    /// The most recently added receiving chain, i.e. the peer's current ratchet key from our
    /// point of view.
    pub(crate) fn latest_receiver_chain_mut(&mut self) -> Option<&mut ReceiverChain> {
        self.receiver_chains.last_mut()
    }

    pub(crate) fn latest_receiver_chain(&self) -> Option<&ReceiverChain> {
        self.receiver_chains.last()
    }

    /// Appends a receiving chain, evicting the oldest one past the bound.
    pub(crate) fn add_receiver_chain(&mut self, chain: ReceiverChain) {
        self.receiver_chains.push(chain);
        if self.receiver_chains.len() > MAX_RECEIVER_CHAINS {
            self.receiver_chains.remove(0);
        }
    }

    pub fn pending_prekey(&self) -> Option<&PendingPreKey> {
        self.pending_prekey.as_ref()
    }

    pub(crate) fn set_pending_prekey(&mut self, pending: PendingPreKey) {
        self.pending_prekey = Some(pending);
    }

    /// Clears the handshake marker once a decrypt from the peer proves the handshake completed.
    pub(crate) fn clear_pending_prekey(&mut self) {
        self.pending_prekey = None;
    }

    pub(crate) fn handshake_base_key(&self) -> &PublicKey {
        &self.handshake_base_key
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;
    use crate::keys::{IdentityKeyPair, KeyPair};
    use crate::ratchet::keys::{ChainKey, RootKey};

    use super::{MAX_RECEIVER_CHAINS, MAX_SKIPPED_MESSAGE_KEYS, ReceiverChain, SessionState};

    fn test_state(rng: &Rng) -> SessionState {
        let local = IdentityKeyPair::generate(rng).unwrap();
        let remote = IdentityKeyPair::generate(rng).unwrap();
        let base_key = KeyPair::generate(rng).unwrap();
        SessionState::new(
            local.identity_key(),
            remote.identity_key(),
            42,
            RootKey::from_bytes(rng.random_array().unwrap()),
            KeyPair::generate(rng).unwrap(),
            *base_key.public_key(),
        )
    }

    fn test_chain(rng: &Rng) -> ReceiverChain {
        ReceiverChain::new(
            *KeyPair::generate(rng).unwrap().public_key(),
            ChainKey::from_bytes(rng.random_array().unwrap(), 0),
        )
    }

    #[test]
    fn receiver_chains_are_bounded() {
        let rng = Rng::from_seed([1; 32]);
        let mut state = test_state(&rng);

        let chains: Vec<ReceiverChain> = (0..MAX_RECEIVER_CHAINS + 2)
            .map(|_| test_chain(&rng))
            .collect();
        for chain in &chains {
            state.add_receiver_chain(chain.clone());
        }

        // The two oldest chains got evicted.
        assert!(!state.has_receiver_chain(chains[0].ratchet_key()));
        assert!(!state.has_receiver_chain(chains[1].ratchet_key()));
        assert!(state.has_receiver_chain(chains[2].ratchet_key()));
        assert_eq!(
            state.latest_receiver_chain().unwrap().ratchet_key(),
            chains.last().unwrap().ratchet_key(),
        );
    }

    #[test]
    fn skipped_message_keys_are_bounded_and_single_use() {
        let rng = Rng::from_seed([1; 32]);
        let mut chain = test_chain(&rng);

        let mut chain_key = chain.chain_key().clone();
        for _ in 0..MAX_SKIPPED_MESSAGE_KEYS + 1 {
            chain.cache_skipped_message_key(chain_key.message_key().unwrap());
            chain_key = chain_key.next().unwrap();
        }

        assert_eq!(chain.skipped_message_key_count(), MAX_SKIPPED_MESSAGE_KEYS);

        // Counter zero was furthest in the past and got dropped.
        assert!(chain.take_skipped_message_key(0).is_none());

        // Every other key can be taken exactly once.
        assert!(chain.take_skipped_message_key(1).is_some());
        assert!(chain.take_skipped_message_key(1).is_none());
    }

    #[test]
    fn retiring_sender_chain_records_its_length() {
        let rng = Rng::from_seed([1; 32]);
        let mut state = test_state(&rng);

        // Nothing to retire on a fresh state.
        state.retire_sender_chain();
        assert_eq!(state.previous_counter(), 0);

        let chain_key = ChainKey::from_bytes(rng.random_array().unwrap(), 0);
        state.set_sender_chain(super::SenderChain::new(chain_key.next().unwrap().next().unwrap()));
        assert!(state.has_ratcheted());

        state.retire_sender_chain();
        assert!(!state.has_sender_chain());
        assert_eq!(state.previous_counter(), 2);
    }
}
