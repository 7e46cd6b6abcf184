// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::crypto::Rng;
use crate::keys::KeyPair;
use crate::message::{CIPHERTEXT_VERSION, Envelope, PendingHandshake};
use crate::ratchet::{
    MAX_SKIPPED_MESSAGE_KEYS, MessageKey, ReceiverChain, SenderChain, SessionRecord, SessionState,
};
use crate::session::SessionError;

/// Encrypts and decrypts application messages under an established session.
///
/// Pure functions over a [`SessionRecord`]: the mutated record is returned for the caller to
/// persist. A failed decrypt returns an error without any observable state change, so the record
/// in the store stays byte-for-byte as it was and a retry with corrected input remains possible.
pub struct SessionCipher;

impl SessionCipher {
    /// Encrypts a plaintext under the session's sending chain, advancing the chain by one step.
    ///
    /// When the previous sending chain was retired by a ratchet step, a fresh chain under a new
    /// ratchet key is derived first. The returned envelope carries the handshake block for the
    /// peer as long as the session's handshake is still unconfirmed.
    pub fn encrypt(
        mut record: SessionRecord,
        plaintext: &[u8],
        rng: &Rng,
    ) -> Result<(SessionRecord, Envelope), SessionError> {
        let Some(state) = record.session_state_mut() else {
            return Err(SessionError::NoSession);
        };

        if !state.has_sender_chain() {
            Self::create_sender_chain(state, rng)?;
        }

        let Some(chain_key) = state.sender_chain().map(|chain| chain.chain_key().clone()) else {
            return Err(SessionError::NoSession);
        };

        let message_key = chain_key.message_key()?;
        let aad = Self::associated_data(state, Direction::Sending);
        let ciphertext = message_key.encrypt(plaintext, &aad)?;

        let pending = state.pending_prekey().map(|pending| {
            PendingHandshake::new(
                state.local_registration_id(),
                pending.signed_prekey_id(),
                pending.onetime_prekey_id(),
                *pending.base_key(),
                *state.local_identity(),
            )
        });

        let envelope = Envelope::new(
            CIPHERTEXT_VERSION,
            *state.local_ratchet_key().public_key(),
            chain_key.index(),
            state.previous_counter(),
            ciphertext,
            pending,
        );

        let next_chain_key = chain_key.next()?;
        if let Some(chain) = state.sender_chain_mut() {
            chain.set_chain_key(next_chain_key);
        }

        Ok((record, envelope))
    }

    /// Decrypts an envelope, trying the active session state first and archived states in
    /// recency order afterwards. The state which matches is promoted and committed; when no
    /// attempt succeeds the record is returned to the caller untouched by dropping it.
    pub fn decrypt(
        mut record: SessionRecord,
        envelope: &Envelope,
    ) -> Result<(SessionRecord, Vec<u8>), SessionError> {
        match envelope.version() {
            version if version < CIPHERTEXT_VERSION => {
                return Err(SessionError::LegacyMessage(version));
            }
            version if version > CIPHERTEXT_VERSION => {
                return Err(SessionError::InvalidVersion(version));
            }
            _ => {}
        }

        if let Some(state) = record.session_state().cloned() {
            match Self::decrypt_with_state(state, envelope) {
                Ok((state, plaintext)) => {
                    record.set_session_state(state);
                    return Ok((record, plaintext));
                }
                // Mismatching chains surface as authentication failures; the message may belong
                // to an archived state.
                Err(SessionError::InvalidMessage(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let archived: Vec<SessionState> = record.previous_states().cloned().collect();
        for (index, state) in archived.into_iter().enumerate() {
            match Self::decrypt_with_state(state, envelope) {
                Ok((state, plaintext)) => {
                    record.promote_state(index, state);
                    return Ok((record, plaintext));
                }
                Err(SessionError::InvalidMessage(_)) => {}
                Err(err) => return Err(err),
            }
        }

        Err(SessionError::InvalidMessage(
            "no session state matches the message".into(),
        ))
    }

    /// Attempts a decrypt against a single state. Works on a clone, so a failure leaves the
    /// record untouched.
    fn decrypt_with_state(
        mut state: SessionState,
        envelope: &Envelope,
    ) -> Result<(SessionState, Vec<u8>), SessionError> {
        if !state.has_receiver_chain(envelope.ratchet_key()) {
            Self::step_ratchet(&mut state, envelope)?;
        }

        let Some(chain) = state.receiver_chain_mut(envelope.ratchet_key()) else {
            return Err(SessionError::InvalidMessage(
                "receiving chain disappeared during ratchet step".into(),
            ));
        };
        let message_key = Self::resolve_message_key(chain, envelope.counter())?;

        let aad = Self::associated_data(&state, Direction::Receiving);
        let plaintext = message_key.decrypt(envelope.ciphertext(), &aad)?;

        // The peer demonstrably holds the session now; stop resending the handshake block.
        state.clear_pending_prekey();

        Ok((state, plaintext))
    }

    /// The peer moved to a new ratchet key: derive the next receiving chain from the root key and
    /// retire our sending chain, which is rebuilt lazily on the next encrypt.
    fn step_ratchet(state: &mut SessionState, envelope: &Envelope) -> Result<(), SessionError> {
        // Collect message keys still owed on the previous chain before the new one takes over.
        if let Some(chain) = state.latest_receiver_chain_mut() {
            Self::skip_message_keys(chain, envelope.previous_counter())?;
        }

        let (root_key, chain_key) = state.root_key().create_chain(
            envelope.ratchet_key(),
            state.local_ratchet_key().secret_key(),
        )?;
        state.set_root_key(root_key);
        state.retire_sender_chain();
        state.add_receiver_chain(ReceiverChain::new(*envelope.ratchet_key(), chain_key));

        Ok(())
    }

    /// Rebuilds the sending chain under a fresh ratchet key after the previous chain was retired
    /// by a ratchet step.
    fn create_sender_chain(state: &mut SessionState, rng: &Rng) -> Result<(), SessionError> {
        let Some(their_ratchet_key) = state
            .latest_receiver_chain()
            .map(|chain| *chain.ratchet_key())
        else {
            // No chain in either direction means the handshake never completed.
            return Err(SessionError::NoSession);
        };

        let our_ratchet_key = KeyPair::generate(rng)?;
        let (root_key, chain_key) = state
            .root_key()
            .create_chain(&their_ratchet_key, our_ratchet_key.secret_key())?;

        state.set_root_key(root_key);
        state.set_local_ratchet_key(our_ratchet_key);
        state.set_sender_chain(SenderChain::new(chain_key));

        Ok(())
    }

    /// Resolves the message key for `counter` on the identified chain.
    ///
    /// Walks the chain forward when the counter is ahead, caching every intermediate key as
    /// "skipped" for later out-of-order delivery. A counter behind the chain must hit a cached
    /// key; anything else was already consumed once and is rejected as a replay.
    fn resolve_message_key(
        chain: &mut ReceiverChain,
        counter: u32,
    ) -> Result<MessageKey, SessionError> {
        let current_index = chain.chain_key().index();

        if counter < current_index {
            return chain
                .take_skipped_message_key(counter)
                .ok_or(SessionError::DuplicateMessage(counter));
        }

        if counter - current_index > MAX_SKIPPED_MESSAGE_KEYS as u32 {
            return Err(SessionError::InvalidMessage(format!(
                "message counter {counter} is further ahead of the chain than supported"
            )));
        }

        let mut chain_key = chain.chain_key().clone();
        while chain_key.index() < counter {
            chain.cache_skipped_message_key(chain_key.message_key()?);
            chain_key = chain_key.next()?;
        }

        let message_key = chain_key.message_key()?;
        chain.set_chain_key(chain_key.next()?);
        Ok(message_key)
    }

    /// Derives and caches the message keys of a chain up to (excluding) `until`, without moving
    /// past it.
    fn skip_message_keys(chain: &mut ReceiverChain, until: u32) -> Result<(), SessionError> {
        let mut chain_key = chain.chain_key().clone();

        if until.saturating_sub(chain_key.index()) > MAX_SKIPPED_MESSAGE_KEYS as u32 {
            return Err(SessionError::InvalidMessage(format!(
                "previous chain length {until} is further ahead of the chain than supported"
            )));
        }

        while chain_key.index() < until {
            chain.cache_skipped_message_key(chain_key.message_key()?);
            chain_key = chain_key.next()?;
        }
        chain.set_chain_key(chain_key);

        Ok(())
    }

    /// Both directions authenticate the identity keys of sender and receiver, in that order.
    fn associated_data(state: &SessionState, direction: Direction) -> Vec<u8> {
        let (sender, receiver) = match direction {
            Direction::Sending => (state.local_identity(), state.remote_identity()),
            Direction::Receiving => (state.remote_identity(), state.local_identity()),
        };

        let mut aad = Vec::with_capacity(2 * sender.encode().len());
        aad.extend_from_slice(&sender.encode());
        aad.extend_from_slice(&receiver.encode());
        aad
    }
}

enum Direction {
    Sending,
    Receiving,
}
