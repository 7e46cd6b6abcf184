// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces to external collaborators the engine consumes but does not implement.
//!
//! Directory discovery and transport delivery live outside this crate; applications implement
//! these traits against their server or peer-to-peer infrastructure and drive the
//! [`SessionManager`](crate::SessionManager) with them.
use std::error::Error;

use crate::keys::PreKeyBundle;
use crate::store::Address;

/// Directory service handing out published pre-key bundles.
///
/// Used to bootstrap a session toward a peer which is currently offline. Implementations should
/// hand out each one-time pre-key at most once.
pub trait PreKeyDirectory {
    type Error: Error;

    fn request_prekey_bundle(&self, address: &Address) -> Result<PreKeyBundle, Self::Error>;
}

/// Outbound transport delivering envelope bytes to a peer device.
///
/// Reliability (retries, backoff) is the transport's concern, not the engine's.
pub trait EnvelopeTransport {
    type Error: Error;

    fn deliver(&self, address: &Address, envelope_bytes: &[u8]) -> Result<(), Self::Error>;
}
