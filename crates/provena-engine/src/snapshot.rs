//! State snapshot and restore with BLAKE3 hashing.
//!
//! Provides [`StateSnapshot`] -- a serializable copy of every key/value pair
//! in the executor's store plus the batch counter, with a BLAKE3 content hash
//! for integrity verification and determinism testing.
//!
//! # Usage
//!
//! ```
//! use provena_engine::prelude::*;
//!
//! let mut executor = Executor::new(EngineConfig::default());
//! let create = Message::from_json(
//!     r#"{"type":"create_asset","id":"a1","name":"Tea","quantity":"5","unit":"kg"}"#,
//! ).unwrap();
//! executor.apply_batch(vec![Envelope::new("alice", 1, create)]);
//!
//! let snapshot = executor.capture_snapshot();
//! assert_eq!(snapshot.batches_applied, 1);
//! assert_eq!(snapshot.hash, executor.state_hash());
//!
//! executor.apply_batch(Vec::new());
//! executor.restore_from_snapshot(&snapshot).unwrap();
//! assert_eq!(executor.batches_applied(), 1);
//! ```
//!
//! # What Is NOT Serialized
//!
//! - **Journal** -- reset to an empty journal on restore. Outcomes from
//!   before the snapshot are not preserved.
//! - **Configuration** -- the restoring executor keeps its own
//!   [`EngineConfig`](crate::executor::EngineConfig).

use provena_core::reconcile::{verify_indices, verify_inventory};
use provena_core::store::MemStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::executor::Executor;
use crate::EngineError;

// ---------------------------------------------------------------------------
// StateSnapshot
// ---------------------------------------------------------------------------

/// A serializable snapshot of the executor's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Every store entry, in ascending key order.
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
    /// Number of batches applied at the time of capture.
    pub batches_applied: u64,
    /// BLAKE3 hex digest (64 lowercase hex chars) of the entries and batch
    /// counter.
    pub hash: String,
}

// ---------------------------------------------------------------------------
// Hashing helpers
// ---------------------------------------------------------------------------

/// Hash the batch counter followed by each length-prefixed key and value.
fn compute_hash<'a>(
    entries: impl IntoIterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>,
    batches_applied: u64,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&batches_applied.to_le_bytes());
    for (key, value) in entries {
        hasher.update(&(key.len() as u64).to_le_bytes());
        hasher.update(key);
        hasher.update(&(value.len() as u64).to_le_bytes());
        hasher.update(value);
    }
    hasher.finalize().to_hex().to_string()
}

fn check_order(entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), EngineError> {
    match entries.windows(2).position(|w| w[0].0 >= w[1].0) {
        Some(i) => Err(EngineError::MalformedSnapshot {
            reason: format!("entry {} is not strictly after entry {i}", i + 1),
        }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Executor snapshot/restore methods
// ---------------------------------------------------------------------------

impl Executor {
    /// Capture a complete snapshot of the executor state.
    pub fn capture_snapshot(&self) -> StateSnapshot {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = self
            .store()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let hash = compute_hash(entries.iter().map(|(k, v)| (k, v)), self.batches_applied());

        StateSnapshot {
            entries,
            batches_applied: self.batches_applied(),
            hash,
        }
    }

    /// Restore the executor from a previously captured snapshot.
    ///
    /// The snapshot is validated before anything is replaced:
    ///
    /// - its hash is recomputed and compared with the recorded one,
    /// - its keys must be strictly ascending,
    /// - its owner, reporter and recipient indices and inventory balances
    ///   must agree with the asset and proposal records.
    ///
    /// On success the store and batch counter are replaced and the journal
    /// is reset.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] on any validation failure. The executor is
    /// left untouched in that case.
    pub fn restore_from_snapshot(&mut self, snapshot: &StateSnapshot) -> Result<(), EngineError> {
        let recomputed = compute_hash(
            snapshot.entries.iter().map(|(k, v)| (k, v)),
            snapshot.batches_applied,
        );
        if recomputed != snapshot.hash {
            return Err(EngineError::SnapshotHashMismatch {
                recorded: snapshot.hash.clone(),
                recomputed,
            });
        }
        check_order(&snapshot.entries)?;

        let store = MemStore::from_entries(snapshot.entries.iter().cloned());
        let index_issues = verify_indices(&store)?.len();
        let inventory_issues = verify_inventory(&store)?.len();
        if index_issues + inventory_issues > 0 {
            return Err(EngineError::InconsistentSnapshot {
                index_issues,
                inventory_issues,
            });
        }

        self.replace_state(store, snapshot.batches_applied);
        info!(
            batches_applied = snapshot.batches_applied,
            entries = snapshot.entries.len(),
            hash = %snapshot.hash,
            "state restored from snapshot"
        );
        Ok(())
    }

    /// BLAKE3 hex digest of the current state. Equal to
    /// `capture_snapshot().hash` without copying the store.
    pub fn state_hash(&self) -> String {
        compute_hash(self.store().iter(), self.batches_applied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::EngineConfig;
    use provena_core::keys::owner_index_key;
    use provena_core::message::{CreateAsset, Envelope, Message};

    fn seeded() -> Executor {
        let mut executor = Executor::new(EngineConfig::default());
        executor.apply_batch(vec![Envelope::new(
            "alice",
            1,
            Message::CreateAsset(CreateAsset {
                id: "a1".into(),
                name: "Tea".to_owned(),
                quantity: 5u32.into(),
                unit: "kg".to_owned(),
                parent_id: None,
                properties: Vec::new(),
            }),
        )]);
        executor
    }

    #[test]
    fn hash_matches_state_hash() {
        let executor = seeded();
        let snapshot = executor.capture_snapshot();
        assert_eq!(snapshot.hash, executor.state_hash());
        assert_eq!(snapshot.hash.len(), 64);
    }

    #[test]
    fn batch_counter_is_part_of_the_hash() {
        let mut executor = seeded();
        let before = executor.state_hash();
        executor.apply_batch(Vec::new());
        assert_ne!(executor.state_hash(), before);
    }

    #[test]
    fn unordered_entries_are_rejected() {
        let executor = seeded();
        let mut snapshot = executor.capture_snapshot();
        snapshot.entries.reverse();
        snapshot.hash = compute_hash(
            snapshot.entries.iter().map(|(k, v)| (k, v)),
            snapshot.batches_applied,
        );

        let mut target = Executor::new(EngineConfig::default());
        assert!(matches!(
            target.restore_from_snapshot(&snapshot),
            Err(EngineError::MalformedSnapshot { .. })
        ));
        assert!(target.store().is_empty());
    }

    #[test]
    fn missing_index_is_rejected() {
        let executor = seeded();
        let mut snapshot = executor.capture_snapshot();
        // Drop the owner index entry but keep the asset record.
        let owner_key = owner_index_key(&"alice".into(), &"a1".into());
        snapshot.entries.retain(|(k, _)| *k != owner_key);
        snapshot.hash = compute_hash(
            snapshot.entries.iter().map(|(k, v)| (k, v)),
            snapshot.batches_applied,
        );

        let mut target = Executor::new(EngineConfig::default());
        assert!(matches!(
            target.restore_from_snapshot(&snapshot),
            Err(EngineError::InconsistentSnapshot { index_issues: 1, .. })
        ));
    }
}
