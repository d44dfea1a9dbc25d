//! Message journal for tracking every dispatched message with its outcome.
//!
//! The [`MessageJournal`] records one [`JournalEntry`] per message handed to
//! the dispatcher, in delivery order. Each entry carries a monotonically
//! increasing sequence number that survives eviction, so two observers can
//! agree on "entry 42" even after the journal has rolled over.
//!
//! # Query API
//!
//! The journal supports querying entries by:
//! - **Asset**: [`MessageJournal::entries_for_asset`]
//! - **Sender**: [`MessageJournal::entries_by_sender`]
//! - **Action**: [`MessageJournal::entries_for_action`]
//! - **Outcome tag**: [`MessageJournal::entries_with_tag`]
//! - **Failure**: [`MessageJournal::failures`]
//!
//! # Example
//!
//! ```
//! use provena_core::prelude::*;
//! use provena_journal::journal::MessageJournal;
//!
//! let config = ModuleConfig::default();
//! let mut kv = MemStore::new();
//! let mut journal = MessageJournal::new();
//!
//! let envelope = Envelope::new(
//!     "farmer",
//!     1,
//!     Message::from_json(r#"{"type":"finalize","asset_id":"missing"}"#).unwrap(),
//! );
//! let result = Dispatcher::new(&config).dispatch(&mut kv, &envelope);
//! journal.record(&envelope, &result, &config.codespace);
//!
//! assert_eq!(journal.len(), 1);
//! assert_eq!(journal.failures().count(), 1);
//! ```

use std::collections::VecDeque;

use provena_core::identity::{AccountId, AssetId};
use provena_core::message::{Envelope, IndexTag, MessageKind, Outcome};
use provena_core::AssetError;
use serde::{Deserialize, Serialize};
use tracing::trace;

// ---------------------------------------------------------------------------
// JournalEntry
// ---------------------------------------------------------------------------

/// Why a message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Module namespace the code belongs to.
    pub codespace: String,
    /// Stable numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

impl Failure {
    pub fn from_error(codespace: &str, error: &AssetError) -> Self {
        Self {
            codespace: codespace.to_owned(),
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// One dispatched message and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal's total order, starting at 0.
    pub sequence: u64,
    pub block_time: u64,
    pub action: MessageKind,
    pub sender: AccountId,
    /// The asset the message targeted.
    pub asset_id: AssetId,
    /// Outcome tags. Empty for failed messages.
    pub tags: Vec<IndexTag>,
    /// `None` when the message was applied.
    pub failure: Option<Failure>,
}

impl JournalEntry {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// The value of the outcome tag named `key`, if any.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

// ---------------------------------------------------------------------------
// MessageJournal
// ---------------------------------------------------------------------------

/// Accumulates [`JournalEntry`] records and answers queries over them.
///
/// With a capacity limit the journal keeps only the most recent entries;
/// older ones are evicted from the front.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageJournal {
    entries: VecDeque<JournalEntry>,
    capacity: Option<usize>,
    next_sequence: u64,
}

impl MessageJournal {
    /// An unbounded journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// A journal retaining at most `capacity` entries.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Record the result of dispatching `envelope`. Returns the entry's
    /// sequence number.
    pub fn record(
        &mut self,
        envelope: &Envelope,
        result: &Result<Outcome, AssetError>,
        codespace: &str,
    ) -> u64 {
        let (tags, failure) = match result {
            Ok(outcome) => (outcome.tags.clone(), None),
            Err(error) => (Vec::new(), Some(Failure::from_error(codespace, error))),
        };
        self.push(JournalEntry {
            sequence: self.next_sequence,
            block_time: envelope.block_time,
            action: envelope.message.kind(),
            sender: envelope.sender.clone(),
            asset_id: envelope.message.asset_id().clone(),
            tags,
            failure,
        })
    }

    /// Append a pre-built entry, renumbering it into this journal's
    /// sequence.
    pub fn push(&mut self, mut entry: JournalEntry) -> u64 {
        let sequence = self.next_sequence;
        entry.sequence = sequence;
        self.next_sequence += 1;
        self.entries.push_back(entry);

        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                if let Some(evicted) = self.entries.pop_front() {
                    trace!(sequence = evicted.sequence, "journal entry evicted");
                }
            }
        }
        sequence
    }

    /// Drop every retained entry. Sequence numbering continues.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// The sequence number the next entry will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Retained entries in sequence order.
    pub fn entries(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter()
    }

    /// The entry with `sequence`, if still retained.
    pub fn get(&self, sequence: u64) -> Option<&JournalEntry> {
        let first = self.entries.front()?.sequence;
        let offset = usize::try_from(sequence.checked_sub(first)?).ok()?;
        self.entries.get(offset)
    }

    /// Entries with a sequence number of at least `sequence`.
    pub fn since(&self, sequence: u64) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter().filter(move |e| e.sequence >= sequence)
    }

    /// Entries targeting `asset`.
    pub fn entries_for_asset<'a>(
        &'a self,
        asset: &'a AssetId,
    ) -> impl Iterator<Item = &'a JournalEntry> {
        self.entries.iter().filter(move |e| &e.asset_id == asset)
    }

    /// Entries sent by `sender`.
    pub fn entries_by_sender<'a>(
        &'a self,
        sender: &'a AccountId,
    ) -> impl Iterator<Item = &'a JournalEntry> {
        self.entries.iter().filter(move |e| &e.sender == sender)
    }

    /// Entries of one message kind.
    pub fn entries_for_action(&self, action: MessageKind) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter().filter(move |e| e.action == action)
    }

    /// Successful entries carrying the tag `key = value`.
    pub fn entries_with_tag<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> impl Iterator<Item = &'a JournalEntry> {
        self.entries
            .iter()
            .filter(move |e| e.tag(key) == Some(value))
    }

    /// Rejected entries.
    pub fn failures(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter().filter(|e| !e.succeeded())
    }

    /// Applied entries.
    pub fn successes(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter().filter(|e| e.succeeded())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
