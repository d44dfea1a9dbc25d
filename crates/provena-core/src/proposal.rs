//! The role proposal state machine.
//!
//! An owner offers a role ([`ProposalRole::Owner`] or
//! [`ProposalRole::Reporter`]) to a recipient. The offer stays
//! [`ProposalStatus::Pending`] until answered:
//!
//! ```text
//!            Accept (recipient)   -> Accepted
//! Pending -- Reject (recipient)   -> Rejected
//!            Cancel (issuer)      -> Cancelled
//! ```
//!
//! Terminal states are never persisted; answering deletes the record and the
//! terminal status is reported to the caller. At most one pending proposal
//! exists per (asset, recipient): proposing again overwrites it in place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::asset::Asset;
use crate::asset_store::AssetStore;
use crate::auth;
use crate::codec;
use crate::identity::{AccountId, AssetId};
use crate::keys;
use crate::ledger::MaterialLedger;
use crate::reporter::{normalize_names, Reporter};
use crate::store::KvStore;
use crate::AssetError;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// The role a proposal offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalRole {
    /// Full custody of the asset.
    Owner,
    /// Write access to the listed property names.
    Reporter,
}

impl ProposalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalRole::Owner => "owner",
            ProposalRole::Reporter => "reporter",
        }
    }
}

impl fmt::Display for ProposalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalRole {
    type Err = AssetError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "owner" => Ok(ProposalRole::Owner),
            "reporter" => Ok(ProposalRole::Reporter),
            other => Err(AssetError::InvalidField {
                field: "role",
                reason: format!("unknown role '{other}'"),
            }),
        }
    }
}

/// Lifecycle state of a proposal. Only `Pending` is ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Cancelled,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Cancelled => "cancelled",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An answer to a pending proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Accept,
    Reject,
    Cancel,
}

impl Response {
    pub fn as_str(self) -> &'static str {
        match self {
            Response::Accept => "accept",
            Response::Reject => "reject",
            Response::Cancel => "cancel",
        }
    }

    /// The state a proposal ends in after this response.
    pub fn terminal_status(self) -> ProposalStatus {
        match self {
            Response::Accept => ProposalStatus::Accepted,
            Response::Reject => ProposalStatus::Rejected,
            Response::Cancel => ProposalStatus::Cancelled,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Response {
    type Err = AssetError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "accept" => Ok(Response::Accept),
            "reject" => Ok(Response::Reject),
            "cancel" => Ok(Response::Cancel),
            other => Err(AssetError::InvalidField {
                field: "response",
                reason: format!("unknown response '{other}'"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// A pending offer of a role on one asset to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub asset_id: AssetId,
    /// The owner at the time the proposal was (last) made.
    pub issuer: AccountId,
    pub recipient: AccountId,
    pub role: ProposalRole,
    pub status: ProposalStatus,
    /// Sorted, unique. Empty for owner-role proposals.
    pub properties: Vec<String>,
}

impl Proposal {
    pub fn pending(
        asset_id: AssetId,
        issuer: AccountId,
        recipient: AccountId,
        role: ProposalRole,
        properties: Vec<String>,
    ) -> Self {
        let properties = match role {
            ProposalRole::Owner => Vec::new(),
            ProposalRole::Reporter => normalize_names(properties),
        };
        Self {
            asset_id,
            issuer,
            recipient,
            role,
            status: ProposalStatus::Pending,
            properties,
        }
    }
}

/// The result of answering a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// The proposal as it stood when answered, with its terminal status.
    pub proposal: Proposal,
    /// The asset after the answer was applied.
    pub asset: Asset,
}

// ---------------------------------------------------------------------------
// Read helpers (shared with queries)
// ---------------------------------------------------------------------------

pub(crate) fn read_proposal<S: KvStore + ?Sized>(
    kv: &S,
    asset: &AssetId,
    recipient: &AccountId,
) -> Result<Option<Proposal>, AssetError> {
    codec::load(kv, &keys::proposal_key(asset, recipient))
}

pub(crate) fn read_proposals_for_asset<S: KvStore + ?Sized>(
    kv: &S,
    asset: &AssetId,
) -> Result<Vec<Proposal>, AssetError> {
    kv.scan_prefix(&keys::proposal_prefix(asset))
        .into_iter()
        .map(|(key, bytes)| codec::decode(&key, &bytes))
        .collect()
}

pub(crate) fn read_proposals_for_recipient<S: KvStore + ?Sized>(
    kv: &S,
    recipient: &AccountId,
) -> Result<Vec<Proposal>, AssetError> {
    let assets = crate::asset_store::index_members(
        kv,
        keys::PROPOSAL_RECIPIENT_NAMESPACE,
        &keys::proposal_recipient_prefix(recipient),
    )?;
    let mut proposals = Vec::with_capacity(assets.len());
    for asset in assets {
        let key = keys::proposal_key(&asset, recipient);
        let proposal = codec::load(kv, &key)?.ok_or_else(|| AssetError::Codec {
            key: keys::display_key(&key),
            details: "recipient index points at a missing proposal".to_owned(),
        })?;
        proposals.push(proposal);
    }
    Ok(proposals)
}

// ---------------------------------------------------------------------------
// ProposalEngine
// ---------------------------------------------------------------------------

/// Create, answer and revoke role proposals.
pub struct ProposalEngine<'a, S: KvStore + ?Sized> {
    kv: &'a mut S,
}

impl<'a, S: KvStore + ?Sized> ProposalEngine<'a, S> {
    pub fn new(kv: &'a mut S) -> Self {
        Self { kv }
    }

    /// Offer `role` on `asset_id` to `recipient`.
    ///
    /// An existing pending proposal for the same recipient is overwritten.
    pub fn create_proposal(
        &mut self,
        asset_id: &AssetId,
        recipient: &AccountId,
        role: ProposalRole,
        properties: &[String],
        issuer: &AccountId,
    ) -> Result<Proposal, AssetError> {
        let asset = AssetStore::new(&mut *self.kv).get(asset_id)?;
        asset.ensure_mutable()?;
        if !auth::can_create_proposal(&asset, issuer) {
            return Err(AssetError::Unauthorized {
                principal: issuer.clone(),
                action: "create proposal",
                asset: asset_id.clone(),
            });
        }
        if recipient == issuer {
            return Err(AssetError::InvalidField {
                field: "recipient",
                reason: "cannot propose to oneself".to_owned(),
            });
        }
        if role == ProposalRole::Reporter && properties.is_empty() {
            return Err(AssetError::MissingField {
                field: "property_names",
            });
        }

        let replaced = read_proposal(&*self.kv, asset_id, recipient)?.is_some();
        let proposal = Proposal::pending(
            asset_id.clone(),
            issuer.clone(),
            recipient.clone(),
            role,
            properties.to_vec(),
        );
        self.store(&proposal)?;

        debug!(
            asset_id = %asset_id,
            recipient = %recipient,
            role = %role,
            replaced,
            "proposal created"
        );
        Ok(proposal)
    }

    /// Answer the pending proposal addressed to `recipient`.
    pub fn answer_proposal(
        &mut self,
        asset_id: &AssetId,
        recipient: &AccountId,
        response: Response,
        respondent: &AccountId,
        now: u64,
    ) -> Result<Answer, AssetError> {
        let mut asset = AssetStore::new(&mut *self.kv).get(asset_id)?;
        asset.ensure_mutable()?;
        let mut proposal = read_proposal(&*self.kv, asset_id, recipient)?.ok_or_else(|| {
            AssetError::ProposalNotFound {
                asset: asset_id.clone(),
                recipient: recipient.clone(),
            }
        })?;
        if !auth::can_answer(&proposal, respondent, response) {
            return Err(AssetError::Unauthorized {
                principal: respondent.clone(),
                action: "answer proposal",
                asset: asset_id.clone(),
            });
        }

        if response == Response::Accept {
            if !auth::issuer_still_owns(&asset, &proposal) {
                return Err(AssetError::Unauthorized {
                    principal: proposal.issuer.clone(),
                    action: "grant a role it no longer owns",
                    asset: asset_id.clone(),
                });
            }
            match proposal.role {
                ProposalRole::Owner => self.transfer_ownership(&mut asset, recipient)?,
                ProposalRole::Reporter => {
                    asset.upsert_reporter(Reporter::new(
                        recipient.clone(),
                        proposal.properties.iter().cloned(),
                        now,
                    ));
                    AssetStore::new(&mut *self.kv).put(&asset)?;
                }
            }
        }

        self.remove(asset_id, recipient);
        proposal.status = response.terminal_status();

        debug!(
            asset_id = %asset_id,
            recipient = %recipient,
            status = %proposal.status,
            "proposal answered"
        );
        Ok(Answer { proposal, asset })
    }

    /// Withdraw `properties` from a pending reporter grant. The record is
    /// deleted once no names remain; the surviving proposal is returned
    /// otherwise.
    pub fn revoke_proposal(
        &mut self,
        asset_id: &AssetId,
        recipient: &AccountId,
        properties: &[String],
        issuer: &AccountId,
    ) -> Result<Option<Proposal>, AssetError> {
        let asset = AssetStore::new(&mut *self.kv).get(asset_id)?;
        asset.ensure_mutable()?;
        if !auth::can_revoke_proposal(&asset, issuer) {
            return Err(AssetError::Unauthorized {
                principal: issuer.clone(),
                action: "revoke proposal",
                asset: asset_id.clone(),
            });
        }
        let mut proposal = read_proposal(&*self.kv, asset_id, recipient)?.ok_or_else(|| {
            AssetError::ProposalNotFound {
                asset: asset_id.clone(),
                recipient: recipient.clone(),
            }
        })?;
        if properties.is_empty() {
            return Err(AssetError::MissingField {
                field: "property_names",
            });
        }
        if proposal.role == ProposalRole::Owner {
            return Err(AssetError::InvalidRevokeRecipient {
                asset: asset_id.clone(),
                recipient: recipient.clone(),
                role: proposal.role,
            });
        }

        proposal.properties.retain(|name| !properties.contains(name));
        if proposal.properties.is_empty() {
            self.remove(asset_id, recipient);
            debug!(asset_id = %asset_id, recipient = %recipient, "proposal revoked");
            return Ok(None);
        }
        self.store(&proposal)?;
        debug!(
            asset_id = %asset_id,
            recipient = %recipient,
            remaining = proposal.properties.len(),
            "proposal narrowed"
        );
        Ok(Some(proposal))
    }

    /// The pending proposal for (`asset_id`, `recipient`), if any.
    pub fn get_proposal(
        &self,
        asset_id: &AssetId,
        recipient: &AccountId,
    ) -> Result<Option<Proposal>, AssetError> {
        read_proposal(&*self.kv, asset_id, recipient)
    }

    /// Every pending proposal on `asset_id`, ordered by recipient.
    pub fn proposals_for_asset(&self, asset_id: &AssetId) -> Result<Vec<Proposal>, AssetError> {
        read_proposals_for_asset(&*self.kv, asset_id)
    }

    /// Every pending proposal addressed to `recipient`, ordered by asset.
    pub fn proposals_for_recipient(
        &self,
        recipient: &AccountId,
    ) -> Result<Vec<Proposal>, AssetError> {
        read_proposals_for_recipient(&*self.kv, recipient)
    }

    /// Delete every pending proposal on `asset_id` along with its recipient
    /// index entry. Returns how many were dropped.
    pub fn discard_pending(&mut self, asset_id: &AssetId) -> Result<usize, AssetError> {
        let pending = read_proposals_for_asset(&*self.kv, asset_id)?;
        for proposal in &pending {
            self.remove(asset_id, &proposal.recipient);
        }
        Ok(pending.len())
    }

    // -- internal helpers ---------------------------------------------------

    /// Hand the asset to `new_owner`: move its quantity between inventory
    /// balances, drop every reporter, and persist (which rewrites both
    /// indices).
    fn transfer_ownership(
        &mut self,
        asset: &mut Asset,
        new_owner: &AccountId,
    ) -> Result<(), AssetError> {
        MaterialLedger::new(&mut *self.kv).move_balance(
            &asset.owner,
            new_owner,
            &asset.root_id,
            &asset.quantity,
        )?;
        asset.owner = new_owner.clone();
        asset.reporters.clear();
        AssetStore::new(&mut *self.kv).put(asset)
    }

    fn store(&mut self, proposal: &Proposal) -> Result<(), AssetError> {
        codec::store(
            &mut *self.kv,
            keys::proposal_key(&proposal.asset_id, &proposal.recipient),
            proposal,
        )?;
        self.kv.set(
            keys::proposal_recipient_key(&proposal.recipient, &proposal.asset_id),
            Vec::new(),
        );
        Ok(())
    }

    fn remove(&mut self, asset_id: &AssetId, recipient: &AccountId) {
        self.kv.delete(&keys::proposal_key(asset_id, recipient));
        self.kv
            .delete(&keys::proposal_recipient_key(recipient, asset_id));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
