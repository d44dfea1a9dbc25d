//! The asset record and its material composition.
//!
//! An [`Asset`] is the unit of provenance tracking: a quantity of something,
//! owned by one account, optionally derived from a parent asset, annotated with
//! typed [`Property`] values, composed of consumed [`Material`]s, and writable
//! by delegated [`Reporter`]s.

use std::cmp::Ordering;

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::identity::{AccountId, AssetId};
use crate::property::Property;
use crate::reporter::Reporter;
use crate::AssetError;

// ---------------------------------------------------------------------------
// Material
// ---------------------------------------------------------------------------

/// A quantity of another asset consumed into this asset's composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    /// The consumed component asset.
    pub component_id: AssetId,
    /// How much of the component was consumed.
    #[serde(with = "crate::codec::decimal")]
    pub quantity: BigUint,
}

impl Material {
    pub fn new(component_id: impl Into<AssetId>, quantity: impl Into<BigUint>) -> Self {
        Self {
            component_id: component_id.into(),
            quantity: quantity.into(),
        }
    }
}

/// Sort materials by component and sum duplicate components.
pub fn normalize_materials(materials: &[Material]) -> Vec<Material> {
    let mut sorted = materials.to_vec();
    sorted.sort_by(|a, b| a.component_id.cmp(&b.component_id));
    let mut out: Vec<Material> = Vec::with_capacity(sorted.len());
    for material in sorted {
        match out.last_mut() {
            Some(last) if last.component_id == material.component_id => {
                last.quantity += material.quantity;
            }
            _ => out.push(material),
        }
    }
    out
}

/// Merge `incoming` into the sorted `existing` collection.
///
/// Entries for the same component are summed; entries that sum to zero are
/// dropped. The result is sorted by component id with one entry per
/// component.
pub fn merge_materials(existing: &[Material], incoming: &[Material]) -> Vec<Material> {
    let incoming = normalize_materials(incoming);
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());
    let (mut i, mut j) = (0, 0);

    while i < existing.len() || j < incoming.len() {
        let next = match (existing.get(i), incoming.get(j)) {
            (Some(a), Some(b)) => match a.component_id.cmp(&b.component_id) {
                Ordering::Less => {
                    i += 1;
                    a.clone()
                }
                Ordering::Greater => {
                    j += 1;
                    b.clone()
                }
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                    Material {
                        component_id: a.component_id.clone(),
                        quantity: &a.quantity + &b.quantity,
                    }
                }
            },
            (Some(a), None) => {
                i += 1;
                a.clone()
            }
            (None, Some(b)) => {
                j += 1;
                b.clone()
            }
            (None, None) => break,
        };
        if !next.quantity.is_zero() {
            merged.push(next);
        }
    }

    merged
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A tracked asset record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    /// The account that created the asset. Never changes.
    pub issuer: AccountId,
    /// The current custodian.
    pub owner: AccountId,
    #[serde(with = "crate::codec::decimal")]
    pub quantity: BigUint,
    pub unit: String,
    /// Direct parent in the asset tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<AssetId>,
    /// Top-most ancestor; the inventory denomination of this asset.
    pub root_id: AssetId,
    /// Once set, every mutating message on this asset is rejected.
    #[serde(rename = "final")]
    pub is_final: bool,
    /// Sorted by name, unique names.
    #[serde(default)]
    pub properties: Vec<Property>,
    /// Sorted by component id, no zero entries.
    #[serde(default)]
    pub materials: Vec<Material>,
    /// Sorted by reporter account, unique accounts.
    #[serde(default)]
    pub reporters: Vec<Reporter>,
}

impl Asset {
    /// A fresh root-level asset owned and issued by `owner`.
    pub fn new(
        id: impl Into<AssetId>,
        name: impl Into<String>,
        owner: impl Into<AccountId>,
        quantity: impl Into<BigUint>,
        unit: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let owner = owner.into();
        Self {
            root_id: id.clone(),
            id,
            name: name.into(),
            issuer: owner.clone(),
            owner,
            quantity: quantity.into(),
            unit: unit.into(),
            parent_id: None,
            is_final: false,
            properties: Vec::new(),
            materials: Vec::new(),
            reporters: Vec::new(),
        }
    }

    /// Fail with [`AssetError::AssetAlreadyFinal`] if the asset is frozen.
    pub fn ensure_mutable(&self) -> Result<(), AssetError> {
        if self.is_final {
            return Err(AssetError::AssetAlreadyFinal {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// The reporter entry for `account`, if any.
    pub fn reporter(&self, account: &AccountId) -> Option<&Reporter> {
        self.reporters.iter().find(|r| &r.account == account)
    }

    /// The property named `name`, if set.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Insert or replace the reporter entry for `reporter.account`, keeping
    /// the collection sorted.
    pub fn upsert_reporter(&mut self, reporter: Reporter) {
        match self
            .reporters
            .binary_search_by(|r| r.account.cmp(&reporter.account))
        {
            Ok(pos) => self.reporters[pos] = reporter,
            Err(pos) => self.reporters.insert(pos, reporter),
        }
    }

    /// Remove the reporter entry for `account`. Returns it if present.
    pub fn remove_reporter(&mut self, account: &AccountId) -> Option<Reporter> {
        let pos = self.reporters.iter().position(|r| &r.account == account)?;
        Some(self.reporters.remove(pos))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
