//! Account and asset identifiers.
//!
//! Both identifiers are opaque strings supplied by the surrounding execution
//! context. An [`AccountId`] names a principal whose signature was already
//! verified upstream; an [`AssetId`] names a tracked asset record.
//!
//! Identifiers become segments of store keys (see [`crate::keys`]), so they
//! may not contain the NUL separator byte and are length-capped by
//! [`Limits::max_id_len`](crate::config::Limits::max_id_len).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AssetError;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A resolved, signature-verified principal (owner, issuer, reporter, ...).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap a raw account string. No validation is performed here; see
    /// [`validate_segment`].
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw account string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Unique identifier of an asset record.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Wrap a raw asset id string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw asset id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a string that will become a store key segment.
///
/// Empty values are [`AssetError::MissingField`]; values containing NUL or
/// longer than `max_len` bytes are [`AssetError::InvalidField`].
pub fn validate_segment(field: &'static str, value: &str, max_len: usize) -> Result<(), AssetError> {
    if value.is_empty() {
        return Err(AssetError::MissingField { field });
    }
    if value.as_bytes().contains(&0) {
        return Err(AssetError::InvalidField {
            field,
            reason: "must not contain NUL bytes".to_owned(),
        });
    }
    if value.len() > max_len {
        return Err(AssetError::InvalidField {
            field,
            reason: format!("length {} exceeds maximum {max_len}", value.len()),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
