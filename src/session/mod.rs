// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session establishment (X3DH handshake) and message encryption (double ratchet) for one
//! peer-device pair.
//!
//! Both [`SessionBuilder`] and [`SessionCipher`] are expressed as pure functions over a
//! [`SessionRecord`](crate::ratchet::SessionRecord) without any storage side-effects: they take a
//! record and return the mutated record for the caller to persist. This keeps the cryptographic
//! core independent of the storage mechanism and makes failed operations trivially all-or-nothing,
//! since nothing is persisted unless the whole operation succeeded. The
//! [`SessionManager`](crate::SessionManager) wires these functions to the stores.
mod builder;
mod cipher;

use thiserror::Error;

pub use builder::SessionBuilder;
pub use cipher::SessionCipher;

use crate::cbor::{DecodeError, EncodeError};
use crate::crypto::RngError;
use crate::crypto::hkdf::HkdfError;
use crate::crypto::x25519::X25519Error;
use crate::crypto::xeddsa::XEdDSAError;
use crate::keys::{KeyError, PreKeyBundleError};
use crate::ratchet::RatchetError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed or mismatched key material.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// A referenced signed pre-key is not present in the local stores.
    #[error("no local signed pre-key record with id {0}")]
    InvalidKeyId(u32),

    /// Encrypt was attempted without an established session.
    #[error("no established session for this address")]
    NoSession,

    /// Authentication or parse failure, or a handshake missing a required component.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The message key for this counter was already consumed once.
    #[error("message key for counter {0} was already consumed")]
    DuplicateMessage(u32),

    /// The remote identity key differs from the pinned identity for this peer. Never resolved
    /// automatically; the caller has to explicitly re-trust the new identity.
    #[error("remote identity key differs from the pinned identity")]
    UntrustedIdentity,

    /// The message was produced by a wire version this implementation no longer speaks.
    #[error("message version {0} is no longer supported")]
    LegacyMessage(u8),

    /// The message was produced by a wire version newer than this implementation.
    #[error("unsupported message version {0}")]
    InvalidVersion(u8),

    /// A handshake response arrived which does not correspond to any outstanding request.
    #[error("handshake response does not match an outstanding request")]
    StaleKeyExchange,

    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    Hkdf(#[from] HkdfError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<X25519Error> for SessionError {
    fn from(err: X25519Error) -> Self {
        SessionError::InvalidKey(err.to_string())
    }
}

impl From<XEdDSAError> for SessionError {
    fn from(err: XEdDSAError) -> Self {
        SessionError::InvalidKey(err.to_string())
    }
}

impl From<PreKeyBundleError> for SessionError {
    fn from(err: PreKeyBundleError) -> Self {
        SessionError::InvalidKey(err.to_string())
    }
}

impl From<KeyError> for SessionError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Rng(err) => SessionError::Rng(err),
            KeyError::X25519(err) => err.into(),
            KeyError::XEdDSA(err) => err.into(),
        }
    }
}

impl From<RatchetError> for SessionError {
    fn from(err: RatchetError) -> Self {
        match err {
            RatchetError::Hkdf(err) => SessionError::Hkdf(err),
            RatchetError::X25519(err) => err.into(),
            // An authentication failure on the resolved message key means the message does not
            // belong to the attempted chain (or was tampered with).
            RatchetError::Aead(err) => SessionError::InvalidMessage(err.to_string()),
        }
    }
}
