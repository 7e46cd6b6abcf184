// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing::debug;

use crate::keys::SignedPreKeyId;
use crate::store::{SignedPreKeyStore, StoreError};

/// Age beyond which a superseded signed pre-key is eligible for deletion (15 days). Messages
/// encrypted against a bundle older than this have had ample time to arrive.
pub const SIGNED_PREKEY_ARCHIVE_AGE_SECS: u64 = 15 * 24 * 60 * 60;

/// Deletes superseded signed pre-keys which are past the retention threshold.
///
/// The currently registered record is always kept. Among the superseded records the single most
/// recent one (by timestamp) is kept unconditionally, so at least one fallback decryption key
/// survives even when a deletion races an in-flight handshake that referenced it. Every other
/// superseded record older than [`SIGNED_PREKEY_ARCHIVE_AGE_SECS`] relative to `now` (seconds
/// since the UNIX epoch) is removed.
///
/// Runs as an infrequent background task, independent of message processing. Returns the number
/// of removed records.
pub fn cleanup_signed_prekeys<S: SignedPreKeyStore>(
    store: &S,
    current_id: SignedPreKeyId,
    now: u64,
) -> Result<usize, StoreError> {
    let mut superseded: Vec<_> = store
        .load_all()?
        .into_iter()
        .filter(|record| record.id() != current_id)
        .collect();

    if superseded.len() < 2 {
        return Ok(0);
    }

    // Newest first; the first entry is the unconditional keeper.
    superseded.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));

    let mut removed = 0;
    for record in &superseded[1..] {
        if now.saturating_sub(record.timestamp()) >= SIGNED_PREKEY_ARCHIVE_AGE_SECS {
            debug!(
                id = record.id(),
                timestamp = record.timestamp(),
                "removing superseded signed pre-key"
            );
            store.remove(record.id())?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;
    use crate::keys::{IdentityKeyPair, SignedPreKeyRecord};
    use crate::store::{MemorySignedPreKeyStore, SignedPreKeyStore};

    use super::{SIGNED_PREKEY_ARCHIVE_AGE_SECS, cleanup_signed_prekeys};

    const NOW: u64 = 1_700_000_000;

    fn store_with_records(ages_secs: &[(u32, u64)], rng: &Rng) -> MemorySignedPreKeyStore {
        let identity = IdentityKeyPair::generate(rng).unwrap();
        let store = MemorySignedPreKeyStore::default();
        for (id, age) in ages_secs {
            let record =
                SignedPreKeyRecord::generate(&identity, *id, NOW - age, rng).unwrap();
            store.store(record).unwrap();
        }
        store
    }

    #[test]
    fn retains_current_and_most_recent_superseded() {
        let rng = Rng::from_seed([1; 32]);

        // Record 1 is current; 2, 3 and 4 are superseded and all past the threshold.
        let store = store_with_records(
            &[
                (1, 0),
                (2, SIGNED_PREKEY_ARCHIVE_AGE_SECS + 100),
                (3, SIGNED_PREKEY_ARCHIVE_AGE_SECS + 200),
                (4, SIGNED_PREKEY_ARCHIVE_AGE_SECS + 300),
            ],
            &rng,
        );

        let removed = cleanup_signed_prekeys(&store, 1, NOW).unwrap();
        assert_eq!(removed, 2);

        // The current record and the most recent superseded record survive.
        assert!(store.contains(1).unwrap());
        assert!(store.contains(2).unwrap());
        assert!(!store.contains(3).unwrap());
        assert!(!store.contains(4).unwrap());
    }

    #[test]
    fn fewer_than_two_superseded_deletes_nothing() {
        let rng = Rng::from_seed([1; 32]);

        let store = store_with_records(&[(1, 0), (2, SIGNED_PREKEY_ARCHIVE_AGE_SECS + 100)], &rng);

        let removed = cleanup_signed_prekeys(&store, 1, NOW).unwrap();
        assert_eq!(removed, 0);
        assert!(store.contains(1).unwrap());
        assert!(store.contains(2).unwrap());
    }

    #[test]
    fn records_within_the_grace_window_survive() {
        let rng = Rng::from_seed([1; 32]);

        // Three superseded records, only one of them old enough to delete.
        let store = store_with_records(
            &[
                (1, 0),
                (2, 100),
                (3, 200),
                (4, SIGNED_PREKEY_ARCHIVE_AGE_SECS + 100),
            ],
            &rng,
        );

        let removed = cleanup_signed_prekeys(&store, 1, NOW).unwrap();
        assert_eq!(removed, 1);
        assert!(store.contains(2).unwrap());
        assert!(store.contains(3).unwrap());
        assert!(!store.contains(4).unwrap());
    }
}
