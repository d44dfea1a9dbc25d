//! Delegated property writers.
//!
//! A [`Reporter`] lets an account other than the owner write a fixed set of
//! property names on one asset. Reporter entries live inside the asset record
//! and are mirrored into the reporter index by [`AssetStore`] on every write.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::asset::Asset;
use crate::asset_store::AssetStore;
use crate::auth;
use crate::identity::{AccountId, AssetId};
use crate::store::KvStore;
use crate::AssetError;

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// A delegate authorized to write a restricted set of property names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reporter {
    pub account: AccountId,
    /// Sorted, unique.
    pub properties: Vec<String>,
    /// Block time at which the grant was made.
    pub created_at: u64,
}

impl Reporter {
    pub fn new<I, N>(account: impl Into<AccountId>, properties: I, created_at: u64) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            account: account.into(),
            properties: normalize_names(properties),
            created_at,
        }
    }

    /// Whether this reporter may write `name`.
    pub fn can_write(&self, name: &str) -> bool {
        self.properties.binary_search_by(|p| p.as_str().cmp(name)).is_ok()
    }
}

/// Sort and deduplicate a list of property names.
pub fn normalize_names<I, N>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = N>,
    N: Into<String>,
{
    let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
    names.sort();
    names.dedup();
    names
}

// ---------------------------------------------------------------------------
// ReporterRegistry
// ---------------------------------------------------------------------------

/// Direct owner-driven reporter grants and revocations.
pub struct ReporterRegistry<'a, S: KvStore + ?Sized> {
    kv: &'a mut S,
}

impl<'a, S: KvStore + ?Sized> ReporterRegistry<'a, S> {
    pub fn new(kv: &'a mut S) -> Self {
        Self { kv }
    }

    /// Grant (or replace) `reporter`'s write access to `properties`.
    pub fn create_reporter(
        &mut self,
        asset_id: &AssetId,
        reporter: &AccountId,
        properties: &[String],
        caller: &AccountId,
        now: u64,
    ) -> Result<Asset, AssetError> {
        let mut assets = AssetStore::new(&mut *self.kv);
        let mut asset = assets.get(asset_id)?;
        asset.ensure_mutable()?;
        if !auth::can_manage_reporters(&asset, caller) {
            return Err(AssetError::Unauthorized {
                principal: caller.clone(),
                action: "create reporter",
                asset: asset_id.clone(),
            });
        }
        if auth::is_owner(&asset, reporter) {
            return Err(AssetError::InvalidField {
                field: "reporter",
                reason: "the owner cannot be its own reporter".to_owned(),
            });
        }
        if properties.is_empty() {
            return Err(AssetError::MissingField {
                field: "property_names",
            });
        }

        asset.upsert_reporter(Reporter::new(reporter.clone(), properties.iter().cloned(), now));
        assets.put(&asset)?;

        debug!(asset_id = %asset_id, reporter = %reporter, "reporter granted");
        Ok(asset)
    }

    /// Remove `reporter` from the asset.
    pub fn revoke_reporter(
        &mut self,
        asset_id: &AssetId,
        reporter: &AccountId,
        caller: &AccountId,
    ) -> Result<Asset, AssetError> {
        let mut assets = AssetStore::new(&mut *self.kv);
        let mut asset = assets.get(asset_id)?;
        asset.ensure_mutable()?;
        if !auth::can_manage_reporters(&asset, caller) {
            return Err(AssetError::Unauthorized {
                principal: caller.clone(),
                action: "revoke reporter",
                asset: asset_id.clone(),
            });
        }
        if asset.remove_reporter(reporter).is_none() {
            return Err(AssetError::InvalidRevokeReporter {
                asset: asset_id.clone(),
                reporter: reporter.clone(),
            });
        }
        assets.put(&asset)?;

        debug!(asset_id = %asset_id, reporter = %reporter, "reporter revoked");
        Ok(asset)
    }

    /// The reporters of `asset_id`, sorted by account.
    pub fn reporters_of(&self, asset_id: &AssetId) -> Result<Vec<Reporter>, AssetError> {
        Ok(crate::asset_store::read_asset(&*self.kv, asset_id)?.reporters)
    }

    /// The reporter entry for `account` on `asset_id`, if any.
    pub fn reporter(
        &self,
        asset_id: &AssetId,
        account: &AccountId,
    ) -> Result<Option<Reporter>, AssetError> {
        let asset = crate::asset_store::read_asset(&*self.kv, asset_id)?;
        Ok(asset.reporter(account).cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
