//! Provena Journal - Structured record of every message the module processed.
//!
//! The journal is the audit trail next to the state: each dispatched message,
//! successful or not, becomes one entry carrying its sender, target asset,
//! outcome tags and (for failures) the codespace and numeric error code.
//!
//! # Modules
//!
//! - [`journal`]: The bounded, sequence-numbered message journal and its query
//!   API (by asset, sender, action, tag, failure).
//! - [`summary`]: Aggregate counts and a content digest over a journal window.

#![deny(unsafe_code)]

pub mod journal;
pub mod summary;
