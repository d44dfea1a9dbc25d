//! Typed asset properties and the property store.
//!
//! A [`Property`] pairs a name with a [`PropertyValue`]. The value enum's
//! variant *is* the property type, so a property can never carry a value that
//! disagrees with its declared type. Properties form a set keyed by name;
//! [`PropertyStore::set_properties`] upserts by name and never duplicates.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::asset::Asset;
use crate::asset_store::AssetStore;
use crate::auth;
use crate::codec;
use crate::identity::{AccountId, AssetId};
use crate::keys;
use crate::store::KvStore;
use crate::AssetError;

/// Latitude bound in micro-degrees.
pub const MAX_LATITUDE: i64 = 90_000_000;
/// Longitude bound in micro-degrees.
pub const MAX_LONGITUDE: i64 = 180_000_000;

// ---------------------------------------------------------------------------
// PropertyKind
// ---------------------------------------------------------------------------

/// The type of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Bytes,
    String,
    Boolean,
    Number,
    Enum,
    Location,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PropertyKind::Bytes => "bytes",
            PropertyKind::String => "string",
            PropertyKind::Boolean => "boolean",
            PropertyKind::Number => "number",
            PropertyKind::Enum => "enum",
            PropertyKind::Location => "location",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// PropertyValue
// ---------------------------------------------------------------------------

/// A property value together with its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Bytes(Vec<u8>),
    String(String),
    Boolean(bool),
    Number(i64),
    /// A label drawn from an externally defined enumeration.
    Enum(String),
    /// Coordinates in micro-degrees.
    Location { latitude: i64, longitude: i64 },
}

impl PropertyValue {
    /// The type of this value.
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bytes(_) => PropertyKind::Bytes,
            PropertyValue::String(_) => PropertyKind::String,
            PropertyValue::Boolean(_) => PropertyKind::Boolean,
            PropertyValue::Number(_) => PropertyKind::Number,
            PropertyValue::Enum(_) => PropertyKind::Enum,
            PropertyValue::Location { .. } => PropertyKind::Location,
        }
    }

    /// Check the value lies inside its type's domain.
    pub fn validate(&self) -> Result<(), AssetError> {
        match self {
            PropertyValue::Enum(label) if label.is_empty() => Err(AssetError::InvalidField {
                field: "property.value",
                reason: "enum label must not be empty".to_owned(),
            }),
            PropertyValue::Location {
                latitude,
                longitude,
            } => {
                if latitude.unsigned_abs() > MAX_LATITUDE.unsigned_abs() {
                    return Err(AssetError::InvalidField {
                        field: "property.value",
                        reason: format!("latitude {latitude} out of range"),
                    });
                }
                if longitude.unsigned_abs() > MAX_LONGITUDE.unsigned_abs() {
                    return Err(AssetError::InvalidField {
                        field: "property.value",
                        reason: format!("longitude {longitude} out of range"),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// A named, typed attribute of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn kind(&self) -> PropertyKind {
        self.value.kind()
    }
}

/// Sort a batch by name, keeping the last occurrence of each name.
pub fn normalize_properties(batch: &[Property]) -> Vec<Property> {
    let mut sorted = batch.to_vec();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let mut out: Vec<Property> = Vec::with_capacity(sorted.len());
    for property in sorted {
        match out.last_mut() {
            Some(last) if last.name == property.name => *last = property,
            _ => out.push(property),
        }
    }
    out
}

/// Upsert `batch` into the sorted, name-unique `existing` set.
pub fn upsert_properties(existing: &[Property], batch: &[Property]) -> Vec<Property> {
    let mut merged = existing.to_vec();
    for property in normalize_properties(batch) {
        match merged.binary_search_by(|p| p.name.cmp(&property.name)) {
            Ok(pos) => merged[pos] = property,
            Err(pos) => merged.insert(pos, property),
        }
    }
    merged
}

/// Read one property record directly from its key.
pub(crate) fn read_property<S: KvStore + ?Sized>(
    kv: &S,
    asset: &AssetId,
    name: &str,
) -> Result<Option<Property>, AssetError> {
    codec::load(kv, &keys::property_key(asset, name))
}

/// Read every property of an asset, sorted by name.
pub(crate) fn read_properties<S: KvStore + ?Sized>(
    kv: &S,
    asset: &AssetId,
) -> Result<Vec<Property>, AssetError> {
    let mut properties = kv
        .scan_prefix(&keys::property_prefix(asset))
        .into_iter()
        .map(|(key, bytes)| codec::decode::<Property>(&key, &bytes))
        .collect::<Result<Vec<_>, _>>()?;
    properties.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(properties)
}

// ---------------------------------------------------------------------------
// PropertyStore
// ---------------------------------------------------------------------------

/// Property reads and the `SetProperties` transition.
pub struct PropertyStore<'a, S: KvStore + ?Sized> {
    kv: &'a mut S,
}

impl<'a, S: KvStore + ?Sized> PropertyStore<'a, S> {
    pub fn new(kv: &'a mut S) -> Self {
        Self { kv }
    }

    /// Upsert a batch of properties onto an asset.
    ///
    /// The caller must be the owner, or a reporter authorized for *every*
    /// name in the batch. A single unauthorized name rejects the whole batch.
    pub fn set_properties(
        &mut self,
        asset_id: &AssetId,
        batch: &[Property],
        caller: &AccountId,
    ) -> Result<Asset, AssetError> {
        let mut assets = AssetStore::new(&mut *self.kv);
        let mut asset = assets.get(asset_id)?;
        asset.ensure_mutable()?;

        if batch.is_empty() {
            return Err(AssetError::MissingField {
                field: "properties",
            });
        }
        for property in batch {
            property.value.validate()?;
        }

        let names = batch.iter().map(|p| p.name.as_str());
        if !auth::can_write_properties(&asset, caller, names) {
            return Err(AssetError::Unauthorized {
                principal: caller.clone(),
                action: "write property",
                asset: asset_id.clone(),
            });
        }

        asset.properties = upsert_properties(&asset.properties, batch);
        assets.put(&asset)?;

        debug!(
            asset_id = %asset_id,
            sender = %caller,
            count = batch.len(),
            "properties updated"
        );
        Ok(asset)
    }

    /// The property `name` on `asset_id`, if set.
    pub fn get_property(
        &self,
        asset_id: &AssetId,
        name: &str,
    ) -> Result<Option<Property>, AssetError> {
        read_property(&*self.kv, asset_id, name)
    }

    /// Every property on `asset_id`, sorted by name.
    pub fn properties(&self, asset_id: &AssetId) -> Result<Vec<Property>, AssetError> {
        read_properties(&*self.kv, asset_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::Reporter;
    use crate::store::MemStore;

    fn text(name: &str, value: &str) -> Property {
        Property::new(name, PropertyValue::String(value.to_owned()))
    }

    fn seeded() -> MemStore {
        let mut kv = MemStore::new();
        let mut asset = Asset::new("a1", "Coffee", "owner", 10u32, "kg");
        asset.properties = vec![text("origin", "Kenya")];
        asset.upsert_reporter(Reporter::new("lab", ["grade", "moisture"], 1));
        AssetStore::new(&mut kv).create(&asset).unwrap();
        kv
    }

    #[test]
    fn kind_follows_variant() {
        assert_eq!(text("x", "y").kind(), PropertyKind::String);
        assert_eq!(
            Property::new("loc", PropertyValue::Location { latitude: 0, longitude: 0 }).kind(),
            PropertyKind::Location
        );
        assert_eq!(PropertyKind::Boolean.to_string(), "boolean");
    }

    #[test]
    fn value_domain_checks() {
        assert!(PropertyValue::Enum(String::new()).validate().is_err());
        assert!(PropertyValue::Location { latitude: 90_000_001, longitude: 0 }
            .validate()
            .is_err());
        assert!(PropertyValue::Location { latitude: 0, longitude: -180_000_001 }
            .validate()
            .is_err());
        assert!(PropertyValue::Location { latitude: -90_000_000, longitude: 180_000_000 }
            .validate()
            .is_ok());
    }

    #[test]
    fn json_shape_is_tagged() {
        let json = serde_json::to_value(Property::new("ok", PropertyValue::Boolean(true))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "ok", "value": {"type": "boolean", "value": true}})
        );
    }

    #[test]
    fn normalize_keeps_last_writer() {
        let batch = vec![text("b", "1"), text("a", "1"), text("b", "2")];
        assert_eq!(normalize_properties(&batch), vec![text("a", "1"), text("b", "2")]);

        let batch = vec![text("c", "1"), text("c", "2"), text("a", "x"), text("c", "3")];
        assert_eq!(normalize_properties(&batch), vec![text("a", "x"), text("c", "3")]);
    }

    #[test]
    fn upsert_preserves_unmatched_names() {
        let existing = vec![text("a", "old"), text("c", "keep")];
        let merged = upsert_properties(&existing, &[text("b", "new"), text("a", "new")]);
        assert_eq!(merged, vec![text("a", "new"), text("b", "new"), text("c", "keep")]);
    }

    #[test]
    fn owner_may_write_any_name() {
        let mut kv = seeded();
        let asset = PropertyStore::new(&mut kv)
            .set_properties(&"a1".into(), &[text("origin", "Peru"), text("roast", "dark")], &"owner".into())
            .unwrap();
        assert_eq!(asset.properties, vec![text("origin", "Peru"), text("roast", "dark")]);

        let store = PropertyStore::new(&mut kv);
        assert_eq!(
            store.get_property(&"a1".into(), "roast").unwrap(),
            Some(text("roast", "dark"))
        );
        assert_eq!(store.properties(&"a1".into()).unwrap().len(), 2);
    }

    #[test]
    fn reporter_limited_to_granted_names() {
        let mut kv = seeded();
        let mut store = PropertyStore::new(&mut kv);
        store
            .set_properties(&"a1".into(), &[text("grade", "AA")], &"lab".into())
            .unwrap();

        let err = store
            .set_properties(
                &"a1".into(),
                &[text("moisture", "11%"), text("origin", "Brazil")],
                &"lab".into(),
            )
            .unwrap_err();
        assert!(matches!(err, AssetError::Unauthorized { .. }));

        // The authorized half of the rejected batch was not applied.
        assert_eq!(store.get_property(&"a1".into(), "moisture").unwrap(), None);
        assert_eq!(
            store.get_property(&"a1".into(), "origin").unwrap(),
            Some(text("origin", "Kenya"))
        );
    }

    #[test]
    fn strangers_and_final_assets_rejected() {
        let mut kv = seeded();
        let mut store = PropertyStore::new(&mut kv);
        assert!(matches!(
            store.set_properties(&"a1".into(), &[text("grade", "B")], &"mallory".into()),
            Err(AssetError::Unauthorized { .. })
        ));
        assert!(matches!(
            store.set_properties(&"nope".into(), &[text("grade", "B")], &"owner".into()),
            Err(AssetError::AssetNotFound { .. })
        ));

        let mut assets = AssetStore::new(&mut kv);
        let mut asset = assets.get(&"a1".into()).unwrap();
        asset.is_final = true;
        assets.put(&asset).unwrap();

        assert!(matches!(
            PropertyStore::new(&mut kv).set_properties(&"a1".into(), &[text("grade", "B")], &"owner".into()),
            Err(AssetError::AssetAlreadyFinal { .. })
        ));
    }

    #[test]
    fn empty_batch_is_missing() {
        let mut kv = seeded();
        assert!(matches!(
            PropertyStore::new(&mut kv).set_properties(&"a1".into(), &[], &"owner".into()),
            Err(AssetError::MissingField { field: "properties" })
        ));
    }
}
