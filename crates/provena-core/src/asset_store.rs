//! Canonical asset persistence and the owner/reporter indices.
//!
//! [`AssetStore`] is the only writer of asset records. Every write diffs the
//! new record against the stored one and updates the owner index, the
//! reporter index and the property prefix in the same call, so the primary
//! record and its denormalized views can never drift apart.
//!
//! Layout (see [`crate::keys`]):
//!
//! - `asset/<id>`: the record without its properties.
//! - `property/<id>\0<name>`: one entry per property.
//! - `owner_index/<owner>\0<id>`, `reporter_index/<reporter>\0<id>`: empty
//!   marker values.

use std::collections::BTreeSet;

use crate::asset::Asset;
use crate::codec;
use crate::identity::{AccountId, AssetId};
use crate::keys;
use crate::property;
use crate::reconcile::{self, IndexIssue};
use crate::store::KvStore;
use crate::AssetError;

// ---------------------------------------------------------------------------
// Read helpers (shared with queries)
// ---------------------------------------------------------------------------

/// The stored record without properties.
fn read_record<S: KvStore + ?Sized>(kv: &S, id: &AssetId) -> Result<Option<Asset>, AssetError> {
    codec::load(kv, &keys::asset_key(id))
}

/// Load a full asset, including properties.
pub(crate) fn find_asset<S: KvStore + ?Sized>(
    kv: &S,
    id: &AssetId,
) -> Result<Option<Asset>, AssetError> {
    let Some(mut asset) = read_record(kv, id)? else {
        return Ok(None);
    };
    asset.properties = property::read_properties(kv, id)?;
    Ok(Some(asset))
}

/// Load a full asset or fail with [`AssetError::AssetNotFound`].
pub(crate) fn read_asset<S: KvStore + ?Sized>(kv: &S, id: &AssetId) -> Result<Asset, AssetError> {
    find_asset(kv, id)?.ok_or_else(|| AssetError::AssetNotFound { id: id.clone() })
}

/// Asset ids listed under an index prefix.
pub(crate) fn index_members<S: KvStore + ?Sized>(
    kv: &S,
    namespace: &[u8],
    prefix: &[u8],
) -> Result<Vec<AssetId>, AssetError> {
    kv.scan_prefix(prefix)
        .into_iter()
        .map(|(key, _)| match keys::split_segments(namespace, &key).as_deref() {
            Some([_, asset]) => Ok(AssetId::new(*asset)),
            _ => Err(AssetError::Codec {
                key: keys::display_key(&key),
                details: "malformed index key".to_owned(),
            }),
        })
        .collect()
}

/// Every asset in the store, ordered by id.
pub(crate) fn all_assets<S: KvStore + ?Sized>(kv: &S) -> Result<Vec<Asset>, AssetError> {
    kv.scan_prefix(keys::ASSET_NAMESPACE)
        .into_iter()
        .map(|(key, bytes)| {
            let mut asset: Asset = codec::decode(&key, &bytes)?;
            asset.properties = property::read_properties(kv, &asset.id)?;
            Ok(asset)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// AssetStore
// ---------------------------------------------------------------------------

/// Asset record persistence with index maintenance.
pub struct AssetStore<'a, S: KvStore + ?Sized> {
    kv: &'a mut S,
}

impl<'a, S: KvStore + ?Sized> AssetStore<'a, S> {
    pub fn new(kv: &'a mut S) -> Self {
        Self { kv }
    }

    /// Whether a record exists for `id`.
    pub fn exists(&self, id: &AssetId) -> bool {
        self.kv.contains(&keys::asset_key(id))
    }

    /// Load `id` or fail with [`AssetError::AssetNotFound`].
    pub fn get(&self, id: &AssetId) -> Result<Asset, AssetError> {
        read_asset(&*self.kv, id)
    }

    /// Load `id` if it exists.
    pub fn find(&self, id: &AssetId) -> Result<Option<Asset>, AssetError> {
        find_asset(&*self.kv, id)
    }

    /// Insert a new record. Fails with [`AssetError::DuplicateAsset`] if the
    /// id is taken.
    pub fn create(&mut self, asset: &Asset) -> Result<(), AssetError> {
        if self.exists(&asset.id) {
            return Err(AssetError::DuplicateAsset {
                id: asset.id.clone(),
            });
        }
        self.write(None, asset)
    }

    /// Overwrite an existing record with `asset`, updating every index the
    /// change touches.
    pub fn put(&mut self, asset: &Asset) -> Result<(), AssetError> {
        let previous = read_record(&*self.kv, &asset.id)?;
        self.write(previous.as_ref(), asset)
    }

    /// Ids of the assets owned by `owner`, in id order.
    pub fn assets_by_owner(&self, owner: &AccountId) -> Result<Vec<AssetId>, AssetError> {
        index_members(
            &*self.kv,
            keys::OWNER_INDEX_NAMESPACE,
            &keys::owner_index_prefix(owner),
        )
    }

    /// Ids of the assets on which `reporter` holds a grant, in id order.
    pub fn assets_by_reporter(&self, reporter: &AccountId) -> Result<Vec<AssetId>, AssetError> {
        index_members(
            &*self.kv,
            keys::REPORTER_INDEX_NAMESPACE,
            &keys::reporter_index_prefix(reporter),
        )
    }

    /// Every stored asset, ordered by id.
    pub fn all(&self) -> Result<Vec<Asset>, AssetError> {
        all_assets(&*self.kv)
    }

    /// See [`reconcile::verify_indices`].
    pub fn verify_indices(&self) -> Result<Vec<IndexIssue>, AssetError> {
        reconcile::verify_indices(&*self.kv)
    }

    /// See [`reconcile::rebuild_indices`].
    pub fn rebuild_indices(&mut self) -> Result<usize, AssetError> {
        reconcile::rebuild_indices(&mut *self.kv)
    }

    fn write(&mut self, previous: Option<&Asset>, asset: &Asset) -> Result<(), AssetError> {
        // Owner index.
        match previous {
            Some(prev) if prev.owner == asset.owner => {}
            Some(prev) => {
                self.kv.delete(&keys::owner_index_key(&prev.owner, &asset.id));
                self.kv
                    .set(keys::owner_index_key(&asset.owner, &asset.id), Vec::new());
            }
            None => {
                self.kv
                    .set(keys::owner_index_key(&asset.owner, &asset.id), Vec::new());
            }
        }

        // Reporter index.
        let before: BTreeSet<&AccountId> = previous
            .map(|prev| prev.reporters.iter().map(|r| &r.account).collect())
            .unwrap_or_default();
        let after: BTreeSet<&AccountId> = asset.reporters.iter().map(|r| &r.account).collect();
        for removed in before.difference(&after) {
            self.kv.delete(&keys::reporter_index_key(removed, &asset.id));
        }
        for added in after.difference(&before) {
            self.kv
                .set(keys::reporter_index_key(added, &asset.id), Vec::new());
        }

        // Properties: mirror the record exactly.
        let wanted: BTreeSet<&str> = asset.properties.iter().map(|p| p.name.as_str()).collect();
        for (key, _) in self.kv.scan_prefix(&keys::property_prefix(&asset.id)) {
            let stale = match keys::split_segments(keys::PROPERTY_NAMESPACE, &key).as_deref() {
                Some([_, name]) => !wanted.contains(name),
                _ => true,
            };
            if stale {
                self.kv.delete(&key);
            }
        }
        for property in &asset.properties {
            codec::store(
                &mut *self.kv,
                keys::property_key(&asset.id, &property.name),
                property,
            )?;
        }

        // Primary record, without the properties stored above.
        let mut record = asset.clone();
        record.properties = Vec::new();
        codec::store(&mut *self.kv, keys::asset_key(&asset.id), &record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
