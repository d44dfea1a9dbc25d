//! Module configuration built once at startup.
//!
//! A [`ModuleConfig`] is constructed by the host (defaults, or parsed from
//! JSON) and passed by reference into the [`Dispatcher`](crate::dispatch::Dispatcher).
//! There is no process-wide registry: two dispatchers with different configs
//! can coexist in one process.

use serde::{Deserialize, Serialize};

use crate::AssetError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Size limits applied to incoming messages. Exceeding any of them is an
/// [`AssetError::InvalidField`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum byte length of asset ids and account ids.
    pub max_id_len: usize,
    /// Maximum byte length of asset names, units and property names.
    pub max_name_len: usize,
    /// Maximum number of properties in one message.
    pub max_properties: usize,
    /// Maximum number of material entries in one `AddMaterials`.
    pub max_materials: usize,
    /// Maximum number of property names in a grant or revoke.
    pub max_property_names: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_id_len: 128,
            max_name_len: 128,
            max_properties: 64,
            max_materials: 64,
            max_property_names: 64,
        }
    }
}

impl Limits {
    /// Fail with `InvalidField` if `len` exceeds `max`.
    pub fn check_count(field: &'static str, len: usize, max: usize) -> Result<(), AssetError> {
        if len > max {
            return Err(AssetError::InvalidField {
                field,
                reason: format!("{len} entries exceed maximum {max}"),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ModuleConfig
// ---------------------------------------------------------------------------

/// Configuration for the asset module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Namespace reported alongside error codes (e.g. `"provena"`).
    pub codespace: String,
    /// Message size limits.
    pub limits: Limits,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            codespace: "provena".to_owned(),
            limits: Limits::default(),
        }
    }
}

impl ModuleConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
