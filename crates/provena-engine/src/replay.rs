//! Deterministic replay with batch recording and checkpoint verification.
//!
//! A [`BatchRecorder`] captures every batch delivered to an [`Executor`]
//! together with periodic state hash checkpoints, producing a [`BatchLog`].
//! [`replay`] restores the log's initial snapshot on another executor, feeds
//! it the recorded batches in order, and compares state hashes at each
//! checkpoint.
//!
//! # Recording and replaying
//!
//! ```
//! use provena_engine::prelude::*;
//!
//! let mut live = Executor::new(EngineConfig::default());
//! let mut recorder = BatchRecorder::new(&live);
//!
//! for (i, id) in ["a1", "a2", "a3"].into_iter().enumerate() {
//!     let json = format!(
//!         r#"{{"type":"create_asset","id":"{id}","name":"Tea","quantity":"1","unit":"kg"}}"#
//!     );
//!     let envelope = Envelope::new("alice", i as u64, Message::from_json(&json).unwrap());
//!     recorder.apply(&mut live, vec![envelope]).unwrap();
//! }
//! let log = recorder.finish();
//!
//! let mut follower = Executor::new(EngineConfig::default());
//! let result = replay(&mut follower, &log).unwrap();
//! assert!(result.completed);
//! assert!(result.first_divergence.is_none());
//! assert_eq!(follower.state_hash(), live.state_hash());
//! ```

use std::collections::BTreeMap;

use anyhow::Context;
use provena_core::config::ModuleConfig;
use provena_core::message::Envelope;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::executor::{BatchReport, Executor};
use crate::snapshot::StateSnapshot;
use crate::EngineError;

// ---------------------------------------------------------------------------
// BatchLog
// ---------------------------------------------------------------------------

/// A complete recording: initial snapshot plus the ordered sequence of
/// batches and checkpoints.
///
/// The log is fully serializable to JSON for storage, transmission, or
/// regression test fixtures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLog {
    /// The state at the start of recording. Replay begins by restoring it.
    pub initial_snapshot: StateSnapshot,
    /// Module configuration in force while recording. Limits and codespace
    /// affect outcomes, so replay refuses an executor configured otherwise.
    pub module: ModuleConfig,
    /// Number of batches recorded.
    pub total_batches: u64,
    /// Ordered batches and checkpoints.
    pub entries: Vec<BatchEntry>,
}

// ---------------------------------------------------------------------------
// BatchEntry
// ---------------------------------------------------------------------------

/// One entry in a [`BatchLog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchEntry {
    /// The messages delivered as batch `index`.
    Batch { index: u64, envelopes: Vec<Envelope> },
    /// The state hash taken before batch `index` was applied.
    Checkpoint { index: u64, state_hash: String },
}

// ---------------------------------------------------------------------------
// ReplayResult / ReplayDivergence
// ---------------------------------------------------------------------------

/// The outcome of replaying a [`BatchLog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayResult {
    /// Whether every recorded batch was replayed.
    pub completed: bool,
    pub batches_replayed: u64,
    /// The first checkpoint whose replayed hash differs from the recorded
    /// one. `None` if all checkpoints matched.
    pub first_divergence: Option<ReplayDivergence>,
}

/// Details about a determinism failure detected during replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayDivergence {
    /// Index of the batch about to be applied when the mismatch was seen.
    pub batch: u64,
    pub expected_hash: String,
    pub actual_hash: String,
}

// ---------------------------------------------------------------------------
// BatchRecorder
// ---------------------------------------------------------------------------

/// Records the batches applied to an executor into a [`BatchLog`].
///
/// Batch indices must be strictly increasing. Use
/// [`apply`](Self::apply) to record and execute in one step, or
/// [`record_batch`](Self::record_batch) when the caller drives the executor
/// itself.
#[derive(Debug, Clone)]
pub struct BatchRecorder {
    log: BatchLog,
    checkpoint_interval: u64,
    batches_recorded: u64,
    last_index: Option<u64>,
}

impl BatchRecorder {
    /// Start recording from the executor's current state, using its
    /// configured checkpoint interval.
    pub fn new(executor: &Executor) -> Self {
        Self::with_interval(executor, executor.config().checkpoint_interval)
    }

    /// Start recording with an explicit checkpoint interval. An interval of
    /// 0 records a checkpoint whenever a hash is supplied.
    pub fn with_interval(executor: &Executor, checkpoint_interval: u64) -> Self {
        Self {
            log: BatchLog {
                initial_snapshot: executor.capture_snapshot(),
                module: executor.config().module.clone(),
                total_batches: 0,
                entries: Vec::new(),
            },
            checkpoint_interval,
            batches_recorded: 0,
            last_index: None,
        }
    }

    /// Whether a checkpoint is due before batch `index`.
    pub fn checkpoint_due(&self, index: u64) -> bool {
        self.checkpoint_interval == 0 || index % self.checkpoint_interval == 0
    }

    /// Record batch `index` before it is applied.
    ///
    /// A checkpoint is written if `state_hash` is `Some` and the index falls
    /// on the checkpoint interval.
    ///
    /// # Errors
    ///
    /// [`EngineError::OutOfOrderBatch`] if `index` is not strictly greater
    /// than the previously recorded index. Nothing is recorded in that case.
    pub fn record_batch(
        &mut self,
        index: u64,
        envelopes: &[Envelope],
        state_hash: Option<String>,
    ) -> Result<(), EngineError> {
        if let Some(previous) = self.last_index {
            if index <= previous {
                return Err(EngineError::OutOfOrderBatch { index, previous });
            }
        }
        self.last_index = Some(index);
        self.batches_recorded += 1;

        if let Some(state_hash) = state_hash {
            if self.checkpoint_due(index) {
                self.log
                    .entries
                    .push(BatchEntry::Checkpoint { index, state_hash });
            }
        }
        self.log.entries.push(BatchEntry::Batch {
            index,
            envelopes: envelopes.to_vec(),
        });
        Ok(())
    }

    /// Record `batch` (with a checkpoint when due) and apply it to
    /// `executor`.
    pub fn apply(
        &mut self,
        executor: &mut Executor,
        batch: Vec<Envelope>,
    ) -> Result<BatchReport, EngineError> {
        let index = executor.batches_applied();
        let hash = self.checkpoint_due(index).then(|| executor.state_hash());
        self.record_batch(index, &batch, hash)?;
        Ok(executor.apply_batch(batch))
    }

    /// Finish recording and return the log.
    pub fn finish(mut self) -> BatchLog {
        self.log.total_batches = self.batches_recorded;
        self.log
    }
}

// ---------------------------------------------------------------------------
// replay()
// ---------------------------------------------------------------------------

/// Replay a [`BatchLog`] against an executor, verifying determinism at each
/// checkpoint.
///
/// The log is validated (no duplicate batches or checkpoints, no index
/// overflow, matching module configuration) before the executor is
/// touched. The initial snapshot is then restored and batches
/// `[start, start + total_batches)` are applied in order, where `start` is
/// the snapshot's batch counter. A batch index with no recorded entry is
/// applied as an empty batch.
///
/// Replay stops at the first divergent checkpoint.
///
/// # Errors
///
/// Returns an error if the log is malformed or the initial snapshot fails
/// to restore. On error the executor is unmodified.
pub fn replay(executor: &mut Executor, log: &BatchLog) -> Result<ReplayResult, anyhow::Error> {
    if executor.config().module != log.module {
        anyhow::bail!("executor module configuration differs from the recorded one");
    }

    let mut batches: BTreeMap<u64, &[Envelope]> = BTreeMap::new();
    let mut checkpoints: BTreeMap<u64, &str> = BTreeMap::new();
    for entry in &log.entries {
        match entry {
            BatchEntry::Batch { index, envelopes } => {
                if batches.insert(*index, envelopes).is_some() {
                    anyhow::bail!("batch log contains duplicate Batch entry at index {index}");
                }
            }
            BatchEntry::Checkpoint { index, state_hash } => {
                if checkpoints.insert(*index, state_hash).is_some() {
                    anyhow::bail!(
                        "batch log contains duplicate Checkpoint entry at index {index}"
                    );
                }
            }
        }
    }

    let start = log.initial_snapshot.batches_applied;
    let end = start.checked_add(log.total_batches).with_context(|| {
        format!(
            "batch range overflow: start ({start}) + total_batches ({}) exceeds u64::MAX",
            log.total_batches
        )
    })?;

    executor
        .restore_from_snapshot(&log.initial_snapshot)
        .context("failed to restore initial snapshot for replay")?;

    let mut batches_replayed = 0;
    for index in start..end {
        if let Some(&expected) = checkpoints.get(&index) {
            let actual = executor.state_hash();
            if actual != expected {
                warn!(batch = index, expected, actual = %actual, "replay diverged");
                return Ok(ReplayResult {
                    completed: false,
                    batches_replayed,
                    first_divergence: Some(ReplayDivergence {
                        batch: index,
                        expected_hash: expected.to_owned(),
                        actual_hash: actual,
                    }),
                });
            }
        }

        let batch = batches.get(&index).map(|b| b.to_vec()).unwrap_or_default();
        executor.apply_batch(batch);
        batches_replayed += 1;
    }

    info!(batches = batches_replayed, "replay completed");
    Ok(ReplayResult {
        completed: true,
        batches_replayed,
        first_divergence: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::EngineConfig;

    #[test]
    fn out_of_order_batches_are_refused() {
        let executor = Executor::new(EngineConfig::default());
        let mut recorder = BatchRecorder::new(&executor);
        recorder.record_batch(3, &[], None).unwrap();
        assert_eq!(
            recorder.record_batch(3, &[], None),
            Err(EngineError::OutOfOrderBatch {
                index: 3,
                previous: 3
            })
        );
        assert_eq!(recorder.finish().total_batches, 1);
    }

    #[test]
    fn checkpoints_follow_interval() {
        let mut executor = Executor::new(EngineConfig::default());
        let mut recorder = BatchRecorder::with_interval(&executor, 2);
        for _ in 0..5 {
            recorder.apply(&mut executor, Vec::new()).unwrap();
        }
        let log = recorder.finish();
        let checkpoints: Vec<u64> = log
            .entries
            .iter()
            .filter_map(|e| match e {
                BatchEntry::Checkpoint { index, .. } => Some(*index),
                BatchEntry::Batch { .. } => None,
            })
            .collect();
        assert_eq!(checkpoints, vec![0, 2, 4]);
        assert_eq!(log.total_batches, 5);
    }

    #[test]
    fn duplicate_batches_leave_executor_untouched() {
        let executor = Executor::new(EngineConfig::default());
        let mut log = BatchRecorder::new(&executor).finish();
        log.total_batches = 1;
        for _ in 0..2 {
            log.entries.push(BatchEntry::Batch {
                index: 0,
                envelopes: Vec::new(),
            });
        }

        let mut target = Executor::new(EngineConfig::default());
        target.apply_batch(Vec::new());
        assert!(replay(&mut target, &log).is_err());
        assert_eq!(target.batches_applied(), 1);
    }

    #[test]
    fn mismatched_module_config_is_refused() {
        let executor = Executor::new(EngineConfig::default());
        let log = BatchRecorder::new(&executor).finish();

        let mut config = EngineConfig::default();
        config.module.codespace = "other".to_owned();
        let mut target = Executor::new(config);
        assert!(replay(&mut target, &log).is_err());
    }
}
