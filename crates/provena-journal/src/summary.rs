//! Aggregates over a journal window.
//!
//! A [`JournalSummary`] condenses the retained entries of a
//! [`MessageJournal`] into per-action and per-error-code counts plus a blake3
//! digest of the entries themselves. Two nodes that processed the same
//! messages produce the same digest.

use std::collections::BTreeMap;

use provena_core::message::MessageKind;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::journal::{JournalEntry, MessageJournal};

/// Applied/rejected counts for one message kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    pub succeeded: usize,
    pub failed: usize,
}

/// Summary statistics for a run of journal entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSummary {
    /// Sequence numbers covered, inclusive. `None` for an empty window.
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub by_action: BTreeMap<MessageKind, ActionCounts>,
    /// Rejections keyed by `codespace:code`.
    pub failures_by_code: BTreeMap<String, usize>,
    /// Hex blake3 digest over the entries in sequence order.
    pub digest: String,
}

impl JournalSummary {
    /// Summarize every entry retained by `journal`.
    pub fn of(journal: &MessageJournal) -> Self {
        Self::from_entries(journal.entries())
    }

    /// Summarize an arbitrary run of entries, in the order given.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a JournalEntry>) -> Self {
        let mut summary = Self {
            first_sequence: None,
            last_sequence: None,
            total: 0,
            succeeded: 0,
            failed: 0,
            by_action: BTreeMap::new(),
            failures_by_code: BTreeMap::new(),
            digest: String::new(),
        };
        let mut hasher = blake3::Hasher::new();

        for entry in entries {
            summary.first_sequence.get_or_insert(entry.sequence);
            summary.last_sequence = Some(entry.sequence);
            summary.total += 1;

            let counts = summary.by_action.entry(entry.action).or_default();
            match &entry.failure {
                None => {
                    summary.succeeded += 1;
                    counts.succeeded += 1;
                }
                Some(failure) => {
                    summary.failed += 1;
                    counts.failed += 1;
                    *summary
                        .failures_by_code
                        .entry(format!("{}:{}", failure.codespace, failure.code))
                        .or_default() += 1;
                }
            }

            match serde_json::to_vec(entry) {
                Ok(bytes) => {
                    hasher.update(&(bytes.len() as u64).to_le_bytes());
                    hasher.update(&bytes);
                }
                Err(error) => {
                    warn!(sequence = entry.sequence, %error, "journal entry not encodable");
                    hasher.update(&u64::MAX.to_le_bytes());
                }
            }
        }

        summary.digest = hasher.finalize().to_hex().to_string();
        summary
    }
}
