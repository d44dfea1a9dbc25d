//! Provena Engine -- batch executor with journaling, snapshots and replay.
//!
//! This crate builds on [`provena_core`] to provide the node-side driver: an
//! [`Executor`](executor::Executor) owns the key-value state, applies
//! batches of [`Envelope`](provena_core::message::Envelope)s in delivery
//! order, and records every outcome in a
//! [`MessageJournal`](provena_journal::journal::MessageJournal).
//!
//! # Quick Start
//!
//! ```
//! use provena_engine::prelude::*;
//!
//! let mut executor = Executor::new(EngineConfig::default());
//!
//! let create = Message::from_json(
//!     r#"{"type":"create_asset","id":"a1","name":"Wheat","quantity":"100","unit":"kg"}"#,
//! ).unwrap();
//! let report = executor.apply_batch(vec![Envelope::new("farmer", 1, create)]);
//!
//! assert_eq!(report.success_count, 1);
//! assert_eq!(executor.journal().len(), 1);
//! assert_eq!(executor.state_hash().len(), 64);
//! ```

#![deny(unsafe_code)]

pub mod executor;
pub mod logging;
pub mod replay;
pub mod snapshot;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the core crate for convenience.
pub use provena_core;

/// Re-export the journal crate for convenience.
pub use provena_journal;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the engine layer (snapshots and recording).
///
/// Message-level failures are [`AssetError`](provena_core::AssetError)s and
/// never surface here; they are journaled and counted instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The snapshot's recorded hash does not match its contents.
    #[error("snapshot hash mismatch: recorded {recorded} but recomputed {recomputed}")]
    SnapshotHashMismatch {
        recorded: String,
        recomputed: String,
    },

    /// Snapshot entries are not in strictly ascending key order.
    #[error("malformed snapshot: {reason}")]
    MalformedSnapshot { reason: String },

    /// The snapshot's derived indices or balances disagree with its records.
    #[error(
        "inconsistent snapshot: {index_issues} index issue(s), {inventory_issues} inventory issue(s)"
    )]
    InconsistentSnapshot {
        index_issues: usize,
        inventory_issues: usize,
    },

    /// A stored record in the snapshot could not be decoded.
    #[error("snapshot state unreadable: {0}")]
    State(#[from] provena_core::AssetError),

    /// Batches must be recorded in strictly increasing order.
    #[error("batch {index} recorded out of order (previous batch {previous})")]
    OutOfOrderBatch { index: u64, previous: u64 },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use provena_core::prelude::*;

    pub use crate::executor::{BatchReport, EngineConfig, Executor};
    pub use crate::replay::{
        replay, BatchEntry, BatchLog, BatchRecorder, ReplayDivergence, ReplayResult,
    };
    pub use crate::snapshot::StateSnapshot;
    pub use crate::EngineError;

    pub use provena_journal::journal::{Failure, JournalEntry, MessageJournal};
    pub use provena_journal::summary::{ActionCounts, JournalSummary};
}
