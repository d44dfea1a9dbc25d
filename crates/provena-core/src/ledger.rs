//! Quantity bookkeeping.
//!
//! [`MaterialLedger`] changes asset quantities and keeps the per-owner,
//! root-denominated inventory balances in step with them. Every path that
//! changes the quantity of an asset also moves the same amount on the owner's
//! balance for that asset's root, so a balance always equals the summed
//! quantity of the assets its owner holds under that root.

use std::collections::BTreeMap;

use num_bigint::BigUint;
use num_traits::Zero;
use tracing::debug;

use crate::asset::{merge_materials, normalize_materials, Asset, Material};
use crate::asset_store::{self, AssetStore};
use crate::auth;
use crate::codec;
use crate::identity::{AccountId, AssetId};
use crate::keys;
use crate::store::KvStore;
use crate::AssetError;

// ---------------------------------------------------------------------------
// Read helpers (shared with queries)
// ---------------------------------------------------------------------------

pub(crate) fn read_balance<S: KvStore + ?Sized>(
    kv: &S,
    owner: &AccountId,
    root: &AssetId,
) -> Result<BigUint, AssetError> {
    Ok(codec::load(kv, &keys::inventory_key(owner, root))?.unwrap_or_default())
}

pub(crate) fn read_balances<S: KvStore + ?Sized>(
    kv: &S,
    owner: &AccountId,
) -> Result<Vec<(AssetId, BigUint)>, AssetError> {
    kv.scan_prefix(&keys::inventory_prefix(owner))
        .into_iter()
        .map(|(key, bytes)| {
            let root = match keys::split_segments(keys::INVENTORY_NAMESPACE, &key).as_deref() {
                Some([_, root]) => AssetId::new(*root),
                _ => {
                    return Err(AssetError::Codec {
                        key: keys::display_key(&key),
                        details: "malformed inventory key".to_owned(),
                    })
                }
            };
            Ok((root, codec::decode(&key, &bytes)?))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MaterialLedger
// ---------------------------------------------------------------------------

/// Quantity changes, material consumption and inventory balances.
pub struct MaterialLedger<'a, S: KvStore + ?Sized> {
    kv: &'a mut S,
}

impl<'a, S: KvStore + ?Sized> MaterialLedger<'a, S> {
    pub fn new(kv: &'a mut S) -> Self {
        Self { kv }
    }

    /// Increase the quantity of `asset_id` by `amount`.
    pub fn add_quantity(
        &mut self,
        asset_id: &AssetId,
        amount: &BigUint,
        caller: &AccountId,
    ) -> Result<Asset, AssetError> {
        let mut asset = self.load_for_change(asset_id, amount, caller, "add quantity")?;
        asset.quantity += amount;
        self.credit(&asset.owner, &asset.root_id, amount)?;
        AssetStore::new(&mut *self.kv).put(&asset)?;

        debug!(asset_id = %asset_id, amount = %amount, quantity = %asset.quantity, "quantity added");
        Ok(asset)
    }

    /// Decrease the quantity of `asset_id` by `amount`.
    pub fn subtract_quantity(
        &mut self,
        asset_id: &AssetId,
        amount: &BigUint,
        caller: &AccountId,
    ) -> Result<Asset, AssetError> {
        let mut asset = self.load_for_change(asset_id, amount, caller, "subtract quantity")?;
        if amount > &asset.quantity {
            return Err(AssetError::InsufficientQuantity {
                id: asset_id.clone(),
                available: asset.quantity.clone(),
                requested: amount.clone(),
            });
        }
        asset.quantity -= amount;
        self.debit(&asset.owner, &asset.root_id, amount)?;
        AssetStore::new(&mut *self.kv).put(&asset)?;

        debug!(asset_id = %asset_id, amount = %amount, quantity = %asset.quantity, "quantity subtracted");
        Ok(asset)
    }

    /// Consume `materials` from their component assets into `asset_id`.
    ///
    /// Every component is validated before anything is written. Repeated
    /// components are checked against their summed demand.
    pub fn add_materials(
        &mut self,
        asset_id: &AssetId,
        materials: &[Material],
        caller: &AccountId,
    ) -> Result<Asset, AssetError> {
        let mut target = AssetStore::new(&mut *self.kv).get(asset_id)?;
        target.ensure_mutable()?;
        if !auth::can_change_quantity(&target, caller) {
            return Err(AssetError::Unauthorized {
                principal: caller.clone(),
                action: "add materials",
                asset: asset_id.clone(),
            });
        }
        if materials.is_empty() {
            return Err(AssetError::MissingField { field: "materials" });
        }
        if materials.iter().any(|m| m.quantity.is_zero()) {
            return Err(AssetError::InvalidField {
                field: "quantity",
                reason: "material quantity must be positive".to_owned(),
            });
        }
        let demand = normalize_materials(materials);

        // Pass 1: validate every component and the caller's balances.
        let mut components = Vec::with_capacity(demand.len());
        let mut per_root: BTreeMap<AssetId, BigUint> = BTreeMap::new();
        for material in &demand {
            if &material.component_id == asset_id {
                return Err(AssetError::InvalidField {
                    field: "materials",
                    reason: "an asset cannot consume itself".to_owned(),
                });
            }
            let component = asset_store::find_asset(&*self.kv, &material.component_id)?
                .ok_or_else(|| AssetError::ComponentAssetNotFound {
                    id: material.component_id.clone(),
                })?;
            component.ensure_mutable()?;
            if !auth::can_change_quantity(&component, caller) {
                return Err(AssetError::Unauthorized {
                    principal: caller.clone(),
                    action: "consume component",
                    asset: component.id.clone(),
                });
            }
            if component.quantity < material.quantity {
                return Err(AssetError::InsufficientQuantity {
                    id: component.id.clone(),
                    available: component.quantity.clone(),
                    requested: material.quantity.clone(),
                });
            }
            *per_root.entry(component.root_id.clone()).or_default() += &material.quantity;
            components.push(component);
        }
        for (root, needed) in &per_root {
            let available = self.balance(caller, root)?;
            if &available < needed {
                return Err(AssetError::InsufficientQuantity {
                    id: root.clone(),
                    available,
                    requested: needed.clone(),
                });
            }
        }

        // Pass 2: apply.
        for (mut component, material) in components.into_iter().zip(&demand) {
            component.quantity -= &material.quantity;
            self.debit(caller, &component.root_id, &material.quantity)?;
            AssetStore::new(&mut *self.kv).put(&component)?;
        }
        target.materials = merge_materials(&target.materials, &demand);
        AssetStore::new(&mut *self.kv).put(&target)?;

        debug!(asset_id = %asset_id, components = demand.len(), "materials added");
        Ok(target)
    }

    // -- inventory ----------------------------------------------------------

    /// `owner`'s balance denominated in `root`. Zero when never credited.
    pub fn balance(&self, owner: &AccountId, root: &AssetId) -> Result<BigUint, AssetError> {
        read_balance(&*self.kv, owner, root)
    }

    /// Every non-zero balance of `owner`, ordered by root.
    pub fn balances_of(&self, owner: &AccountId) -> Result<Vec<(AssetId, BigUint)>, AssetError> {
        read_balances(&*self.kv, owner)
    }

    /// Add `amount` to `owner`'s `root` balance. Returns the new balance.
    pub fn credit(
        &mut self,
        owner: &AccountId,
        root: &AssetId,
        amount: &BigUint,
    ) -> Result<BigUint, AssetError> {
        let balance = self.balance(owner, root)? + amount;
        self.write_balance(owner, root, &balance)?;
        Ok(balance)
    }

    /// Remove `amount` from `owner`'s `root` balance. Returns the new
    /// balance, or [`AssetError::InsufficientQuantity`] on underflow.
    pub fn debit(
        &mut self,
        owner: &AccountId,
        root: &AssetId,
        amount: &BigUint,
    ) -> Result<BigUint, AssetError> {
        let available = self.balance(owner, root)?;
        if &available < amount {
            return Err(AssetError::InsufficientQuantity {
                id: root.clone(),
                available,
                requested: amount.clone(),
            });
        }
        let balance = available - amount;
        self.write_balance(owner, root, &balance)?;
        Ok(balance)
    }

    /// Move `amount` of `root` from `from` to `to`.
    pub fn move_balance(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        root: &AssetId,
        amount: &BigUint,
    ) -> Result<(), AssetError> {
        if from == to || amount.is_zero() {
            return Ok(());
        }
        self.debit(from, root, amount)?;
        self.credit(to, root, amount)?;
        Ok(())
    }

    // -- internal helpers ---------------------------------------------------

    fn load_for_change(
        &self,
        asset_id: &AssetId,
        amount: &BigUint,
        caller: &AccountId,
        action: &'static str,
    ) -> Result<Asset, AssetError> {
        let asset = asset_store::read_asset(&*self.kv, asset_id)?;
        asset.ensure_mutable()?;
        if amount.is_zero() {
            return Err(AssetError::InvalidField {
                field: "amount",
                reason: "amount must be positive".to_owned(),
            });
        }
        if !auth::can_change_quantity(&asset, caller) {
            return Err(AssetError::Unauthorized {
                principal: caller.clone(),
                action,
                asset: asset_id.clone(),
            });
        }
        Ok(asset)
    }

    fn write_balance(
        &mut self,
        owner: &AccountId,
        root: &AssetId,
        balance: &BigUint,
    ) -> Result<(), AssetError> {
        let key = keys::inventory_key(owner, root);
        if balance.is_zero() {
            self.kv.delete(&key);
            return Ok(());
        }
        codec::store(&mut *self.kv, key, balance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
