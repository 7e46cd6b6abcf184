// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::crypto::x25519::PublicKey;
use crate::ratchet::state::SessionState;

/// Version marker of the persisted session record layout. Deserializing any other marker is a
/// hard failure, never a guess.
pub const SESSION_RECORD_VERSION: u32 = 2;

/// Bound on archived session states kept per record. The oldest state is dropped beyond this.
pub const MAX_ARCHIVED_STATES: usize = 40;

/// Container of one active [`SessionState`] plus a bounded archive of superseded states.
///
/// A superseded state is kept around because messages encrypted under it may still be in flight
/// when a fresh handshake replaces it; decryption walks the archive in recency order and promotes
/// whichever state matches.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    current: Option<SessionState>,
    previous: VecDeque<SessionState>,
}

impl SessionRecord {
    /// Returns an empty record. "No session yet" is a valid initial state, not a failure.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_state(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    pub(crate) fn session_state_mut(&mut self) -> Option<&mut SessionState> {
        self.current.as_mut()
    }

    pub(crate) fn set_session_state(&mut self, state: SessionState) {
        self.current = Some(state);
    }

    pub fn previous_states(&self) -> impl Iterator<Item = &SessionState> {
        self.previous.iter()
    }

    /// Number of archived states currently kept.
    pub fn previous_state_count(&self) -> usize {
        self.previous.len()
    }

    /// True when no handshake has touched this record yet.
    pub fn is_fresh(&self) -> bool {
        self.current.is_none() && self.previous.is_empty()
    }

    /// True once a session exists and has completed at least one chain, i.e. it is usable and not
    /// merely a stub.
    pub fn has_usable_session(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|state| state.has_ratcheted())
    }

    /// Archives the active state (if any) and installs a new one in its place.
    ///
    /// Used when a fresh handshake supersedes a live session while messages encrypted under the
    /// old state may still be in flight.
    pub(crate) fn replace_session_state(&mut self, state: SessionState) {
        if let Some(old) = self.current.take() {
            self.previous.push_front(old);
            self.previous.truncate(MAX_ARCHIVED_STATES);
        }
        self.current = Some(state);
    }

    /// Replaces the archived state at `index` with `state` and moves it into the active slot,
    /// archiving the previously active state.
    pub(crate) fn promote_state(&mut self, index: usize, state: SessionState) {
        self.previous.remove(index);
        if let Some(old) = self.current.take() {
            self.previous.push_front(old);
            self.previous.truncate(MAX_ARCHIVED_STATES);
        }
        self.current = Some(state);
    }

    /// Looks for a state (active or archived) established from the given initiator base key and
    /// makes it the active state.
    ///
    /// Returns false when no state matches, i.e. the handshake is genuinely new.
    pub(crate) fn promote_matching_base_key(&mut self, base_key: &PublicKey) -> bool {
        if let Some(current) = &self.current {
            if current.handshake_base_key() == base_key {
                return true;
            }
        }

        let matched = self
            .previous
            .iter()
            .position(|state| state.handshake_base_key() == base_key);

        match matched {
            Some(index) => {
                if let Some(state) = self.previous.remove(index) {
                    if let Some(old) = self.current.take() {
                        self.previous.push_front(old);
                        self.previous.truncate(MAX_ARCHIVED_STATES);
                    }
                    self.current = Some(state);
                }
                true
            }
            None => false,
        }
    }

    /// Serializes the record (without the persistence version marker, which the session store
    /// owns together with the encryption layer).
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}
