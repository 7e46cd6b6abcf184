// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extended Triple Diffie-Hellman (X3DH) session establishment.
//!
//! X3DH establishes a shared secret key between two parties who mutually authenticate each other
//! based on public keys. It is designed for asynchronous settings where one user ("Bob") is
//! offline but has published a pre-key bundle. Another user ("Alice") uses that bundle to derive a
//! session and send encrypted messages to Bob, who derives the identical session from the
//! handshake block attached to her first message.
//!
//! <https://signal.org/docs/specifications/x3dh/>
use crate::crypto::Rng;
use crate::crypto::hkdf::hkdf;
use crate::keys::{IdentityKey, IdentityKeyPair, KeyPair, PreKeyBundle, PreKeyId};
use crate::message::PendingHandshake;
use crate::ratchet::{
    ChainKey, PendingPreKey, ReceiverChain, RootKey, SenderChain, SessionRecord, SessionState,
};
use crate::session::SessionError;
use crate::store::{PreKeyStore, SignedPreKeyStore};

/// ASCII string identifying the application, used as KDF info as specified in X3DH.
const KDF_INFO: &[u8; 8] = b"pangolin";

/// Runs the X3DH handshake, deriving a fresh [`SessionState`] either from a peer's published
/// pre-key bundle (initiator) or from the handshake block of an incoming message (responder).
///
/// Identity pinning is not checked here; the caller compares the remote identity key against its
/// pinned value before invoking the builder.
pub struct SessionBuilder;

impl SessionBuilder {
    /// Derives a new session from the peer's published pre-key bundle.
    ///
    /// Verifies the bundle signature, computes the initiator-side agreements and installs the new
    /// state in the record, archiving any session that was active before. The returned record
    /// carries a pending-handshake marker so outgoing messages reference the consumed bundle
    /// until the peer's first reply.
    pub fn initiate(
        mut record: SessionRecord,
        our_identity: &IdentityKeyPair,
        our_registration_id: u32,
        their_bundle: &PreKeyBundle,
        rng: &Rng,
    ) -> Result<SessionRecord, SessionError> {
        their_bundle.verify()?;

        let our_base_key = KeyPair::generate(rng)?;

        // DH1 = DH(IK_A, SPK_B)
        // DH2 = DH(EK_A, IK_B)
        // DH3 = DH(EK_A, SPK_B)
        // DH4 = DH(EK_A, OPK_B) when a one-time pre-key is present
        let mut ikm = Vec::with_capacity(32 * 5);
        ikm.extend_from_slice(&[0xFFu8; 32]); // "discontinuity bytes"
        ikm.extend_from_slice(
            &our_identity
                .secret_key()
                .calculate_agreement(their_bundle.signed_prekey())?,
        );
        ikm.extend_from_slice(
            &our_base_key.calculate_agreement(their_bundle.identity_key().public_key())?,
        );
        ikm.extend_from_slice(&our_base_key.calculate_agreement(their_bundle.signed_prekey())?);
        if let Some(onetime_prekey) = their_bundle.onetime_prekey() {
            ikm.extend_from_slice(&our_base_key.calculate_agreement(onetime_prekey)?);
        }

        let (root_key, their_chain_key) = Self::derive_initial_keys(&ikm)?;

        // Ratchet once to derive our own sending chain under a fresh ratchet key.
        let our_ratchet_key = KeyPair::generate(rng)?;
        let (root_key, our_chain_key) =
            root_key.create_chain(their_bundle.signed_prekey(), our_ratchet_key.secret_key())?;

        let mut state = SessionState::new(
            IdentityKey::new(*our_identity.public_key()),
            *their_bundle.identity_key(),
            our_registration_id,
            root_key,
            our_ratchet_key,
            *our_base_key.public_key(),
        );

        // The peer's initial sending chain runs under their signed pre-key acting as their first
        // ratchet key.
        state.add_receiver_chain(ReceiverChain::new(
            *their_bundle.signed_prekey(),
            their_chain_key,
        ));
        state.set_sender_chain(SenderChain::new(our_chain_key));

        state.set_pending_prekey(PendingPreKey::new(
            their_bundle.signed_prekey_id(),
            their_bundle.onetime_prekey_id(),
            *our_base_key.public_key(),
        ));

        record.replace_session_state(state);
        Ok(record)
    }

    /// Derives the responder half of a session from the handshake block of an incoming message.
    ///
    /// When the handshake was already processed before (same initiator base key), the existing
    /// state is promoted instead of deriving a second session from the same secrets. Returns the
    /// id of the consumed one-time pre-key, if any; the caller removes it from its store only
    /// after the first decrypt under the new state succeeded.
    pub fn respond<P, S>(
        mut record: SessionRecord,
        our_identity: &IdentityKeyPair,
        our_registration_id: u32,
        prekey_store: &P,
        signed_prekey_store: &S,
        handshake: &PendingHandshake,
    ) -> Result<(SessionRecord, Option<PreKeyId>), SessionError>
    where
        P: PreKeyStore,
        S: SignedPreKeyStore,
    {
        if record.promote_matching_base_key(handshake.base_key()) {
            return Ok((record, None));
        }

        let our_signed_prekey = signed_prekey_store
            .load(handshake.signed_prekey_id())?
            .ok_or(SessionError::InvalidKeyId(handshake.signed_prekey_id()))?;

        let our_onetime_prekey = match handshake.onetime_prekey_id() {
            Some(id) => Some(prekey_store.load(id)?.ok_or_else(|| {
                SessionError::InvalidMessage(format!(
                    "handshake references one-time pre-key {id} which is no longer available"
                ))
            })?),
            None => None,
        };

        let their_identity_key = handshake.identity_key().public_key();
        let their_base_key = handshake.base_key();

        // The same agreements as on the initiator side, mirrored.
        let mut ikm = Vec::with_capacity(32 * 5);
        ikm.extend_from_slice(&[0xFFu8; 32]); // "discontinuity bytes"
        ikm.extend_from_slice(
            &our_signed_prekey
                .key_pair()
                .calculate_agreement(their_identity_key)?,
        );
        ikm.extend_from_slice(&our_identity.secret_key().calculate_agreement(their_base_key)?);
        ikm.extend_from_slice(
            &our_signed_prekey
                .key_pair()
                .calculate_agreement(their_base_key)?,
        );
        if let Some(onetime_prekey) = &our_onetime_prekey {
            ikm.extend_from_slice(&onetime_prekey.key_pair().calculate_agreement(their_base_key)?);
        }

        let (root_key, our_chain_key) = Self::derive_initial_keys(&ikm)?;

        let mut state = SessionState::new(
            IdentityKey::new(*our_identity.public_key()),
            *handshake.identity_key(),
            our_registration_id,
            root_key,
            our_signed_prekey.key_pair().clone(),
            *their_base_key,
        );

        // Our initial sending chain runs under the signed pre-key acting as our first ratchet
        // key; the initiator derived the matching receiving chain from the bundle.
        state.set_sender_chain(SenderChain::new(our_chain_key));

        record.replace_session_state(state);
        Ok((record, handshake.onetime_prekey_id()))
    }

    fn derive_initial_keys(ikm: &[u8]) -> Result<(RootKey, ChainKey), SessionError> {
        let okm: [u8; 64] = {
            let salt = [0u8; 32];
            hkdf(&salt, ikm, Some(KDF_INFO))?
        };

        let mut root = [0u8; 32];
        root.copy_from_slice(&okm[..32]);
        let mut chain = [0u8; 32];
        chain.copy_from_slice(&okm[32..]);

        Ok((
            RootKey::from_bytes(root),
            ChainKey::from_bytes(chain, 0),
        ))
    }
}
