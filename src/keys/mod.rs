// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key material a device generates, persists and publishes so peers can establish encrypted
//! sessions with it while it is offline.
//!
//! Each device holds one long-term identity keypair, a rotating signed pre-key (authenticity
//! proven by an identity-key signature) and a batch of one-time pre-keys which are consumed by at
//! most one incoming handshake each. The public halves are published together as a [`PreKeyBundle`]
//! through a directory service.
//!
//! ## Trust
//!
//! Identity keys are exchanged out-of-band and pinned per peer on first use. The engine never
//! replaces a pinned identity on its own; a changed identity key surfaces as an error until the
//! caller explicitly re-trusts it.
mod bundle;
mod identity;
mod prekey;

use thiserror::Error;

pub use bundle::{PreKeyBundle, PreKeyBundleError};
pub use identity::{IdentityKey, IdentityKeyPair, KeyPair, generate_registration_id};
pub use prekey::{PreKeyId, PreKeyRecord, SignedPreKeyId, SignedPreKeyRecord, generate_prekeys};

use crate::crypto::RngError;
use crate::crypto::x25519::X25519Error;
use crate::crypto::xeddsa::XEdDSAError;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    X25519(#[from] X25519Error),

    #[error(transparent)]
    XEdDSA(#[from] XEdDSAError),
}
