//! Read-only views over a store.
//!
//! [`Queries`] borrows the store immutably, so it can serve reads between
//! messages without going through the dispatcher.

use num_bigint::BigUint;

use crate::asset::Asset;
use crate::asset_store::{find_asset, index_members, read_asset};
use crate::identity::{AccountId, AssetId};
use crate::keys;
use crate::ledger::{read_balance, read_balances};
use crate::property::{read_property, Property};
use crate::proposal::{
    read_proposal, read_proposals_for_asset, read_proposals_for_recipient, Proposal,
};
use crate::reporter::Reporter;
use crate::store::KvStore;
use crate::AssetError;

pub struct Queries<'a, S: KvStore + ?Sized> {
    kv: &'a S,
}

impl<'a, S: KvStore + ?Sized> Queries<'a, S> {
    pub fn new(kv: &'a S) -> Self {
        Self { kv }
    }

    pub fn asset(&self, id: &AssetId) -> Result<Option<Asset>, AssetError> {
        find_asset(self.kv, id)
    }

    /// Assets held by `owner`, ordered by id.
    pub fn assets_by_owner(&self, owner: &AccountId) -> Result<Vec<Asset>, AssetError> {
        let ids = index_members(
            self.kv,
            keys::OWNER_INDEX_NAMESPACE,
            &keys::owner_index_prefix(owner),
        )?;
        self.load_all(ids)
    }

    /// Assets on which `reporter` holds a grant, ordered by id.
    pub fn assets_by_reporter(&self, reporter: &AccountId) -> Result<Vec<Asset>, AssetError> {
        let ids = index_members(
            self.kv,
            keys::REPORTER_INDEX_NAMESPACE,
            &keys::reporter_index_prefix(reporter),
        )?;
        self.load_all(ids)
    }

    pub fn property(&self, asset: &AssetId, name: &str) -> Result<Option<Property>, AssetError> {
        read_property(self.kv, asset, name)
    }

    pub fn reporters(&self, asset: &AssetId) -> Result<Vec<Reporter>, AssetError> {
        Ok(read_asset(self.kv, asset)?.reporters)
    }

    pub fn proposal(
        &self,
        asset: &AssetId,
        recipient: &AccountId,
    ) -> Result<Option<Proposal>, AssetError> {
        read_proposal(self.kv, asset, recipient)
    }

    pub fn proposals_for_asset(&self, asset: &AssetId) -> Result<Vec<Proposal>, AssetError> {
        read_proposals_for_asset(self.kv, asset)
    }

    pub fn proposals_for_recipient(
        &self,
        recipient: &AccountId,
    ) -> Result<Vec<Proposal>, AssetError> {
        read_proposals_for_recipient(self.kv, recipient)
    }

    /// `owner`'s inventory balance denominated in `root`.
    pub fn balance(&self, owner: &AccountId, root: &AssetId) -> Result<BigUint, AssetError> {
        read_balance(self.kv, owner, root)
    }

    /// Every non-zero balance of `owner`, ordered by root.
    pub fn balances(&self, owner: &AccountId) -> Result<Vec<(AssetId, BigUint)>, AssetError> {
        read_balances(self.kv, owner)
    }

    fn load_all(&self, ids: Vec<AssetId>) -> Result<Vec<Asset>, AssetError> {
        ids.iter().map(|id| read_asset(self.kv, id)).collect()
    }
}
