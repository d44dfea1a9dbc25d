//! Consistency checks between primary records and their derived state.
//!
//! Handlers keep indices and balances in step on every write; the routines
//! here verify that after the fact (tests, restore paths) and can regenerate
//! the indices from the primary records.

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::asset_store::all_assets;
use crate::codec;
use crate::identity::{AccountId, AssetId};
use crate::keys;
use crate::proposal::Proposal;
use crate::store::KvStore;
use crate::AssetError;

// ---------------------------------------------------------------------------
// Issue types
// ---------------------------------------------------------------------------

/// Which secondary index an [`IndexIssue`] concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Owner,
    Reporter,
    ProposalRecipient,
}

impl IndexKind {
    fn namespace(self) -> &'static [u8] {
        match self {
            IndexKind::Owner => keys::OWNER_INDEX_NAMESPACE,
            IndexKind::Reporter => keys::REPORTER_INDEX_NAMESPACE,
            IndexKind::ProposalRecipient => keys::PROPOSAL_RECIPIENT_NAMESPACE,
        }
    }

    fn key(self, account: &AccountId, asset: &AssetId) -> Vec<u8> {
        match self {
            IndexKind::Owner => keys::owner_index_key(account, asset),
            IndexKind::Reporter => keys::reporter_index_key(account, asset),
            IndexKind::ProposalRecipient => keys::proposal_recipient_key(account, asset),
        }
    }
}

/// One disagreement between primary records and a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexIssue {
    /// A record implies an index entry that is absent.
    Missing {
        index: IndexKind,
        account: AccountId,
        asset: AssetId,
    },
    /// An index entry has no backing record.
    Stale {
        index: IndexKind,
        account: AccountId,
        asset: AssetId,
    },
    /// An index key that does not split into (account, asset).
    Malformed { index: IndexKind, key: String },
}

/// A balance that disagrees with the summed quantity of the assets it
/// denominates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryIssue {
    pub owner: AccountId,
    pub root: AssetId,
    pub recorded: BigUint,
    pub expected: BigUint,
}

// ---------------------------------------------------------------------------
// Indices
// ---------------------------------------------------------------------------

/// The (account, asset) pairs each index should contain.
fn expected_entries<S: KvStore + ?Sized>(
    kv: &S,
) -> Result<BTreeMap<IndexKind, BTreeSet<(AccountId, AssetId)>>, AssetError> {
    let mut owners = BTreeSet::new();
    let mut reporters = BTreeSet::new();
    let mut recipients = BTreeSet::new();

    for asset in all_assets(kv)? {
        for reporter in &asset.reporters {
            reporters.insert((reporter.account.clone(), asset.id.clone()));
        }
        owners.insert((asset.owner, asset.id));
    }
    for (key, bytes) in kv.scan_prefix(keys::PROPOSAL_NAMESPACE) {
        let proposal: Proposal = codec::decode(&key, &bytes)?;
        recipients.insert((proposal.recipient, proposal.asset_id));
    }

    Ok(BTreeMap::from([
        (IndexKind::Owner, owners),
        (IndexKind::Reporter, reporters),
        (IndexKind::ProposalRecipient, recipients),
    ]))
}

/// Every disagreement between the primary records and the owner, reporter
/// and proposal-recipient indices. Empty when consistent.
pub fn verify_indices<S: KvStore + ?Sized>(kv: &S) -> Result<Vec<IndexIssue>, AssetError> {
    let expected = expected_entries(kv)?;
    let mut issues = Vec::new();

    for (&index, wanted) in &expected {
        let mut present = BTreeSet::new();
        for (key, _) in kv.scan_prefix(index.namespace()) {
            match keys::split_segments(index.namespace(), &key).as_deref() {
                Some([account, asset]) => {
                    present.insert((AccountId::new(*account), AssetId::new(*asset)));
                }
                _ => issues.push(IndexIssue::Malformed {
                    index,
                    key: keys::display_key(&key),
                }),
            }
        }
        for (account, asset) in wanted.difference(&present) {
            issues.push(IndexIssue::Missing {
                index,
                account: account.clone(),
                asset: asset.clone(),
            });
        }
        for (account, asset) in present.difference(wanted) {
            issues.push(IndexIssue::Stale {
                index,
                account: account.clone(),
                asset: asset.clone(),
            });
        }
    }
    Ok(issues)
}

/// Drop every index entry and regenerate all three indices from the primary
/// records. Returns the number of entries written.
pub fn rebuild_indices<S: KvStore + ?Sized>(kv: &mut S) -> Result<usize, AssetError> {
    let expected = expected_entries(&*kv)?;
    let mut written = 0;
    for (&index, entries) in &expected {
        for (key, _) in kv.scan_prefix(index.namespace()) {
            kv.delete(&key);
        }
        for (account, asset) in entries {
            kv.set(index.key(account, asset), Vec::new());
            written += 1;
        }
    }
    info!(entries = written, "indices rebuilt");
    Ok(written)
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Every (owner, root) whose stored balance differs from the summed quantity
/// of the assets that owner holds under that root. Empty when conserved.
pub fn verify_inventory<S: KvStore + ?Sized>(kv: &S) -> Result<Vec<InventoryIssue>, AssetError> {
    let mut expected: BTreeMap<(AccountId, AssetId), BigUint> = BTreeMap::new();
    for asset in all_assets(kv)? {
        *expected.entry((asset.owner, asset.root_id)).or_default() += asset.quantity;
    }

    let mut recorded: BTreeMap<(AccountId, AssetId), BigUint> = BTreeMap::new();
    for (key, bytes) in kv.scan_prefix(keys::INVENTORY_NAMESPACE) {
        let pair = match keys::split_segments(keys::INVENTORY_NAMESPACE, &key).as_deref() {
            Some([owner, root]) => (AccountId::new(*owner), AssetId::new(*root)),
            _ => {
                return Err(AssetError::Codec {
                    key: keys::display_key(&key),
                    details: "malformed inventory key".to_owned(),
                })
            }
        };
        recorded.insert(pair, codec::decode(&key, &bytes)?);
    }

    let pairs: BTreeSet<&(AccountId, AssetId)> = expected.keys().chain(recorded.keys()).collect();
    let zero = BigUint::zero();
    let issues = pairs
        .into_iter()
        .filter_map(|pair| {
            let want = expected.get(pair).unwrap_or(&zero);
            let have = recorded.get(pair).unwrap_or(&zero);
            (want != have).then(|| InventoryIssue {
                owner: pair.0.clone(),
                root: pair.1.clone(),
                recorded: have.clone(),
                expected: want.clone(),
            })
        })
        .collect();
    Ok(issues)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
