//! Batch executor over an in-memory store.
//!
//! The [`Executor`] drives the asset module forward one batch at a time.
//! For each batch:
//!
//! 1. Envelopes are dispatched in delivery order. Each one commits
//!    atomically or not at all.
//! 2. Every outcome, success or rejection, is appended to the journal.
//! 3. The batch counter advances and a [`BatchReport`] is returned.
//!
//! Dispatch depends only on the store contents and the envelope (block time
//! comes from the envelope, never the wall clock), so the same starting
//! state and the same batches always produce the same
//! [`state_hash`](Executor::state_hash).
//!
//! # Example
//!
//! ```
//! use provena_engine::executor::{EngineConfig, Executor};
//! use provena_core::message::{Envelope, Finalize, Message};
//!
//! let mut executor = Executor::new(EngineConfig::default());
//! let finalize = Message::Finalize(Finalize { asset_id: "missing".into() });
//!
//! let report = executor.apply_batch(vec![Envelope::new("alice", 7, finalize)]);
//! assert_eq!(report.failed_count, 1);
//! assert_eq!(executor.batches_applied(), 1);
//! ```

use provena_core::config::ModuleConfig;
use provena_core::dispatch::Dispatcher;
use provena_core::message::{Envelope, Outcome};
use provena_core::query::Queries;
use provena_core::store::MemStore;
use provena_core::AssetError;
use provena_journal::journal::MessageJournal;
use provena_journal::summary::JournalSummary;
use serde::{Deserialize, Serialize};
use tracing::info;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Configuration for an [`Executor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Asset module settings (codespace and message limits).
    pub module: ModuleConfig,
    /// Record a state hash checkpoint every this many batches. Zero records
    /// a checkpoint before every batch.
    pub checkpoint_interval: u64,
    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,
    /// Retain at most this many journal entries. `None` keeps everything.
    pub journal_capacity: Option<usize>,
}

impl Default for EngineConfig {
    /// Checkpoints every 16 batches, `info` logging, 65 536 journal entries.
    fn default() -> Self {
        Self {
            module: ModuleConfig::default(),
            checkpoint_interval: 16,
            log_filter: "info".to_owned(),
            journal_capacity: Some(65_536),
        }
    }
}

impl EngineConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub(crate) fn new_journal(&self) -> MessageJournal {
        match self.journal_capacity {
            Some(capacity) => MessageJournal::with_capacity_limit(capacity),
            None => MessageJournal::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// BatchReport
// ---------------------------------------------------------------------------

/// Summary of the last [`Executor::apply_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Zero-based index of the batch.
    pub batch: u64,
    /// Journal sequence number of the batch's first message.
    pub first_sequence: u64,
    /// Number of messages that committed.
    pub success_count: usize,
    /// Number of messages that were rejected.
    pub failed_count: usize,
}

impl BatchReport {
    /// Total messages in the batch.
    pub fn total(&self) -> usize {
        self.success_count + self.failed_count
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Owns the module state and applies message batches to it.
#[derive(Debug, Clone)]
pub struct Executor {
    store: MemStore,
    config: EngineConfig,
    journal: MessageJournal,
    batches_applied: u64,
    last_report: BatchReport,
}

impl Executor {
    /// Create an executor over an empty store.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(MemStore::new(), config)
    }

    /// Create an executor over existing state.
    pub fn with_store(store: MemStore, config: EngineConfig) -> Self {
        let journal = config.new_journal();
        Self {
            store,
            config,
            journal,
            batches_applied: 0,
            last_report: BatchReport::default(),
        }
    }

    /// Dispatch a single envelope and journal the result.
    ///
    /// This does not advance the batch counter; use
    /// [`apply_batch`](Self::apply_batch) for block processing.
    pub fn apply(&mut self, envelope: &Envelope) -> Result<Outcome, AssetError> {
        let result = Dispatcher::new(&self.config.module).dispatch(&mut self.store, envelope);
        self.journal
            .record(envelope, &result, &self.config.module.codespace);
        result
    }

    /// Apply every envelope of a batch in delivery order.
    ///
    /// Rejected messages do not stop the batch; they are journaled and
    /// counted in [`BatchReport::failed_count`].
    pub fn apply_batch(&mut self, batch: Vec<Envelope>) -> BatchReport {
        let mut report = BatchReport {
            batch: self.batches_applied,
            first_sequence: self.journal.next_sequence(),
            ..BatchReport::default()
        };

        for envelope in &batch {
            match self.apply(envelope) {
                Ok(_) => report.success_count += 1,
                Err(_) => report.failed_count += 1,
            }
        }

        self.batches_applied += 1;
        self.last_report = report;

        info!(
            batch = report.batch,
            messages = report.total(),
            succeeded = report.success_count,
            failed = report.failed_count,
            "batch applied"
        );
        report
    }

    /// Read-only queries over the current state.
    pub fn queries(&self) -> Queries<'_, MemStore> {
        Queries::new(&self.store)
    }

    /// The underlying store.
    pub fn store(&self) -> &MemStore {
        &self.store
    }

    /// The executor's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Outcomes of every message applied so far (subject to the journal's
    /// capacity).
    pub fn journal(&self) -> &MessageJournal {
        &self.journal
    }

    /// Summary over the retained journal entries.
    pub fn journal_summary(&self) -> JournalSummary {
        JournalSummary::of(&self.journal)
    }

    /// Number of batches applied since creation or the last restore.
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    /// Report from the most recent [`apply_batch`](Self::apply_batch).
    pub fn last_report(&self) -> &BatchReport {
        &self.last_report
    }

    // -- Internal helpers used by snapshot restore --

    pub(crate) fn replace_state(&mut self, store: MemStore, batches_applied: u64) {
        self.store = store;
        self.batches_applied = batches_applied;
        self.journal = self.config.new_journal();
        self.last_report = BatchReport::default();
    }
}
