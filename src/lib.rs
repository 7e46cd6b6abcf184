// SPDX-License-Identifier: MIT OR Apache-2.0

//! `pangolin` provides asynchronous end-to-end encrypted messaging sessions between pairs of
//! devices which may never be online at the same time.
//!
//! A device publishes a bundle of public keys (its long-term identity key, a signed pre-key and
//! optionally a one-time pre-key) through a directory service. Any peer can later use that bundle
//! to establish a session and send encrypted messages while the device is offline, using the
//! X3DH key agreement for the handshake. Established sessions advance a double-ratchet chain
//! cipher: every message is encrypted under a key used exactly once, and every round trip mixes a
//! fresh Diffie-Hellman agreement into the session, providing forward secrecy.
//!
//! ## Robustness
//!
//! Store-and-forward delivery reorders, drops and repeats messages, and there is no back channel
//! to re-synchronize. The engine is built for that environment:
//!
//! - Out-of-order messages are handled by caching skipped message keys (bounded, see
//!   [`MAX_SKIPPED_MESSAGE_KEYS`](crate::ratchet::MAX_SKIPPED_MESSAGE_KEYS)).
//! - Replayed messages are rejected; a message key is never used twice.
//! - A handshake racing messages still in flight archives the superseded session state instead of
//!   discarding it, so late messages remain decryptable.
//! - Failed operations mutate nothing, neither in memory nor at rest.
//!
//! ## Trust
//!
//! Peer identity keys are pinned on first use. A changed identity fails every operation with
//! [`SessionError::UntrustedIdentity`](crate::session::SessionError) until the application
//! explicitly re-trusts the new key after its own verification ceremony; the engine never makes
//! that decision itself.
//!
//! ## Storage
//!
//! The cryptographic core is pure: handshake and cipher take a session record and return the
//! mutated record. Persistence happens behind the storage traits in [`store`], with session
//! records encrypted at rest under a store-level master key whose lifecycle is an explicit
//! [`StoreContext`](crate::store::StoreContext) object. The [`SessionManager`] ties both halves
//! together and serializes all load→mutate→persist cycles.
//!
//! ## Scope
//!
//! Transport framing, directory discovery, message history and push delivery are external
//! collaborators, consumed through the interfaces in [`traits`]. Group fan-out and multi-device
//! synchronization are out of scope; a session always connects one local device with one peer
//! device.
pub mod cbor;
pub mod crypto;
pub mod keys;
mod manager;
mod message;
pub mod ratchet;
pub mod session;
pub mod store;
pub mod traits;

pub use crypto::{Rng, RngError};
pub use keys::{
    IdentityKey, IdentityKeyPair, KeyPair, PreKeyBundle, PreKeyRecord, SignedPreKeyRecord,
    generate_prekeys, generate_registration_id,
};
pub use manager::SessionManager;
pub use message::{CIPHERTEXT_VERSION, Envelope, PendingHandshake};
pub use ratchet::{SessionRecord, SessionState};
pub use session::{SessionBuilder, SessionCipher, SessionError};
pub use store::{Address, StoreContext};
