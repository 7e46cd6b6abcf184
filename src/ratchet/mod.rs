// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-ratcheting chain-cipher state for one peer-device pair.
//!
//! Every session derives from one root key. Sending advances a hash-ratcheted sender chain, one
//! message key per message. Receiving a message under a ratchet public key we have not seen before
//! mixes a fresh Diffie-Hellman agreement into the root key ("ratchet step"), which provides
//! forward secrecy: keys from earlier chains cannot be recomputed from later state.
//!
//! Out-of-order messages cause a receiving chain to "jump" ahead and keep the skipped message
//! keys persisted until they are used eventually. In this example the chain has a length of 2 in
//! the moment an out-of-order message for key 4 arrives. The keys for the jumped messages (2 and
//! 3) are pre-generated and kept for later, message 4 is decrypted with the now "latest" chain
//! state.
//!
//! ```text
//! 0
//! 1 <- Current chain "height"
//! 2
//! 3
//! 4 <- New chain "height" after decrypting message 4
//! ```
mod keys;
mod record;
mod state;

pub use keys::{ChainKey, MessageKey, RatchetError, RootKey};
pub use record::{MAX_ARCHIVED_STATES, SESSION_RECORD_VERSION, SessionRecord};
pub use state::{
    MAX_RECEIVER_CHAINS, MAX_SKIPPED_MESSAGE_KEYS, PendingPreKey, ReceiverChain, SenderChain,
    SESSION_VERSION, SessionState,
};
