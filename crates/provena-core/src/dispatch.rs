//! Message routing.
//!
//! The [`Dispatcher`] is the single entry point for state changes. For every
//! [`Envelope`] it:
//!
//! 1. runs the stateless checks ([`Message::validate`]),
//! 2. executes the handler against a [`CacheStore`] overlay,
//! 3. commits the overlay only if the handler returned `Ok`.
//!
//! A failed message therefore leaves the backing store byte-for-byte
//! unchanged, even if its handler wrote before failing.

use tracing::{debug, warn};

use crate::asset::Asset;
use crate::asset_store::AssetStore;
use crate::auth;
use crate::config::ModuleConfig;
use crate::identity::{validate_segment, AccountId};
use crate::ledger::MaterialLedger;
use crate::message::{CreateAsset, Envelope, Finalize, Message, Outcome};
use crate::property::{normalize_properties, PropertyStore};
use crate::proposal::ProposalEngine;
use crate::reporter::ReporterRegistry;
use crate::store::{CacheStore, KvStore};
use crate::AssetError;

/// Routes messages to their handlers under one [`ModuleConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'c> {
    config: &'c ModuleConfig,
}

impl<'c> Dispatcher<'c> {
    pub fn new(config: &'c ModuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'c ModuleConfig {
        self.config
    }

    /// Apply one message to `kv`. All or nothing.
    pub fn dispatch<S: KvStore + ?Sized>(
        &self,
        kv: &mut S,
        envelope: &Envelope,
    ) -> Result<Outcome, AssetError> {
        let kind = envelope.message.kind();
        let result = self.check(envelope).and_then(|()| {
            let mut cache = CacheStore::new(&mut *kv);
            let outcome = execute(&mut cache, envelope)?;
            Ok((outcome, cache.commit()))
        });

        match result {
            Ok((outcome, writes)) => {
                debug!(
                    action = kind.as_str(),
                    asset_id = %envelope.message.asset_id(),
                    sender = %envelope.sender,
                    writes,
                    "message applied"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(
                    action = kind.as_str(),
                    asset_id = %envelope.message.asset_id(),
                    sender = %envelope.sender,
                    codespace = %self.config.codespace,
                    code = e.code(),
                    error = %e,
                    "message rejected"
                );
                Err(e)
            }
        }
    }

    fn check(&self, envelope: &Envelope) -> Result<(), AssetError> {
        let limits = &self.config.limits;
        validate_segment("sender", envelope.sender.as_str(), limits.max_id_len)?;
        envelope.message.validate(limits)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn execute<S: KvStore + ?Sized>(kv: &mut S, envelope: &Envelope) -> Result<Outcome, AssetError> {
    let sender = &envelope.sender;
    let now = envelope.block_time;
    let kind = envelope.message.kind();
    let outcome = Outcome::new(kind, envelope.message.asset_id(), sender);

    match &envelope.message {
        Message::CreateAsset(msg) => {
            create_asset(kv, msg, sender)?;
            Ok(outcome)
        }
        Message::AddQuantity(msg) => {
            MaterialLedger::new(kv).add_quantity(&msg.asset_id, &msg.amount, sender)?;
            Ok(outcome)
        }
        Message::SubtractQuantity(msg) => {
            MaterialLedger::new(kv).subtract_quantity(&msg.asset_id, &msg.amount, sender)?;
            Ok(outcome)
        }
        Message::AddMaterials(msg) => {
            MaterialLedger::new(kv).add_materials(&msg.asset_id, &msg.materials, sender)?;
            Ok(outcome)
        }
        Message::UpdateProperties(msg) => {
            PropertyStore::new(kv).set_properties(&msg.asset_id, &msg.properties, sender)?;
            Ok(outcome)
        }
        Message::Finalize(msg) => {
            finalize(kv, msg, sender)?;
            Ok(outcome)
        }
        Message::CreateProposal(msg) => {
            ProposalEngine::new(kv).create_proposal(
                &msg.asset_id,
                &msg.recipient,
                msg.role,
                &msg.property_names,
                sender,
            )?;
            Ok(outcome
                .with_tag("recipient", msg.recipient.as_str())
                .with_tag("role", msg.role.as_str()))
        }
        Message::AnswerProposal(msg) => {
            let answer = ProposalEngine::new(kv).answer_proposal(
                &msg.asset_id,
                &msg.recipient,
                msg.response,
                sender,
                now,
            )?;
            Ok(outcome
                .with_tag("recipient", msg.recipient.as_str())
                .with_tag("status", answer.proposal.status.as_str()))
        }
        Message::RevokeProposal(msg) => {
            let remaining = ProposalEngine::new(kv).revoke_proposal(
                &msg.asset_id,
                &msg.recipient,
                &msg.property_names,
                sender,
            )?;
            let status = if remaining.is_some() { "pending" } else { "revoked" };
            Ok(outcome
                .with_tag("recipient", msg.recipient.as_str())
                .with_tag("status", status))
        }
        Message::CreateReporter(msg) => {
            ReporterRegistry::new(kv).create_reporter(
                &msg.asset_id,
                &msg.reporter,
                &msg.property_names,
                sender,
                now,
            )?;
            Ok(outcome.with_tag("recipient", msg.reporter.as_str()))
        }
        Message::RevokeReporter(msg) => {
            ReporterRegistry::new(kv).revoke_reporter(&msg.asset_id, &msg.reporter, sender)?;
            Ok(outcome.with_tag("recipient", msg.reporter.as_str()))
        }
    }
}

fn create_asset<S: KvStore + ?Sized>(
    kv: &mut S,
    msg: &CreateAsset,
    sender: &AccountId,
) -> Result<Asset, AssetError> {
    let mut assets = AssetStore::new(&mut *kv);
    if assets.exists(&msg.id) {
        return Err(AssetError::DuplicateAsset { id: msg.id.clone() });
    }

    let mut asset = Asset::new(
        msg.id.clone(),
        msg.name.clone(),
        sender.clone(),
        msg.quantity.clone(),
        msg.unit.clone(),
    );
    for property in &msg.properties {
        property.value.validate()?;
    }
    asset.properties = normalize_properties(&msg.properties);

    match &msg.parent_id {
        // A split moves quantity from the parent to the child under the same
        // owner and root, so the inventory balance is unchanged.
        Some(parent_id) => {
            let mut parent = assets.get(parent_id)?;
            parent.ensure_mutable()?;
            if !auth::is_owner(&parent, sender) {
                return Err(AssetError::Unauthorized {
                    principal: sender.clone(),
                    action: "derive from asset",
                    asset: parent_id.clone(),
                });
            }
            if parent.quantity < msg.quantity {
                return Err(AssetError::InsufficientQuantity {
                    id: parent_id.clone(),
                    available: parent.quantity,
                    requested: msg.quantity.clone(),
                });
            }
            parent.quantity -= &msg.quantity;
            asset.parent_id = Some(parent_id.clone());
            asset.root_id = parent.root_id.clone();
            assets.put(&parent)?;
            assets.create(&asset)?;
        }
        None => {
            assets.create(&asset)?;
            MaterialLedger::new(kv).credit(&asset.owner, &asset.root_id, &asset.quantity)?;
        }
    }

    debug!(
        asset_id = %asset.id,
        root_id = %asset.root_id,
        parent_id = ?asset.parent_id,
        "asset created"
    );
    Ok(asset)
}

fn finalize<S: KvStore + ?Sized>(
    kv: &mut S,
    msg: &Finalize,
    sender: &AccountId,
) -> Result<Asset, AssetError> {
    let mut assets = AssetStore::new(&mut *kv);
    let mut asset = assets.get(&msg.asset_id)?;
    asset.ensure_mutable()?;
    if !auth::can_finalize(&asset, sender) {
        return Err(AssetError::Unauthorized {
            principal: sender.clone(),
            action: "finalize",
            asset: msg.asset_id.clone(),
        });
    }
    asset.is_final = true;
    assets.put(&asset)?;

    // No offer on a final asset can be accepted any more.
    let discarded = ProposalEngine::new(kv).discard_pending(&msg.asset_id)?;
    debug!(asset_id = %asset.id, discarded, "asset finalized");
    Ok(asset)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AddQuantity, SubtractQuantity};
    use crate::store::MemStore;
    use num_bigint::BigUint;

    fn create(id: &str, parent: Option<&str>) -> Message {
        Message::CreateAsset(CreateAsset {
            id: id.into(),
            name: id.to_owned(),
            quantity: BigUint::from(10u32),
            unit: "kg".to_owned(),
            parent_id: parent.map(Into::into),
            properties: Vec::new(),
        })
    }

    fn split(id: &str, parent: &str, quantity: u32) -> Message {
        Message::CreateAsset(CreateAsset {
            id: id.into(),
            name: id.to_owned(),
            quantity: BigUint::from(quantity),
            unit: "kg".to_owned(),
            parent_id: Some(parent.into()),
            properties: Vec::new(),
        })
    }

    #[test]
    fn split_draws_down_parent() {
        let config = ModuleConfig::default();
        let dispatcher = Dispatcher::new(&config);
        let mut kv = MemStore::new();

        dispatcher
            .dispatch(&mut kv, &Envelope::new("alice", 1, create("a1", None)))
            .unwrap();
        let outcome = dispatcher
            .dispatch(&mut kv, &Envelope::new("alice", 2, split("a2", "a1", 4)))
            .unwrap();
        assert_eq!(outcome.tag("action"), Some("create_asset"));

        let mut assets = AssetStore::new(&mut kv);
        let child = assets.get(&"a2".into()).unwrap();
        assert_eq!(child.root_id, "a1".into());
        assert_eq!(child.parent_id, Some("a1".into()));
        assert_eq!(child.quantity, BigUint::from(4u32));
        assert_eq!(assets.get(&"a1".into()).unwrap().quantity, BigUint::from(6u32));

        let ledger = MaterialLedger::new(&mut kv);
        assert_eq!(
            ledger.balance(&"alice".into(), &"a1".into()).unwrap(),
            BigUint::from(10u32)
        );
        assert!(crate::reconcile::verify_inventory(&kv).unwrap().is_empty());
    }

    #[test]
    fn split_cannot_exceed_parent() {
        let config = ModuleConfig::default();
        let dispatcher = Dispatcher::new(&config);
        let mut kv = MemStore::new();
        dispatcher
            .dispatch(&mut kv, &Envelope::new("alice", 1, create("a1", None)))
            .unwrap();
        dispatcher
            .dispatch(&mut kv, &Envelope::new("alice", 2, split("a2", "a1", 7)))
            .unwrap();
        let before = kv.clone();

        assert_eq!(
            dispatcher.dispatch(&mut kv, &Envelope::new("alice", 3, split("a3", "a1", 4))),
            Err(AssetError::InsufficientQuantity {
                id: "a1".into(),
                available: BigUint::from(3u32),
                requested: BigUint::from(4u32),
            })
        );
        assert_eq!(kv, before);
    }

    #[test]
    fn final_parent_cannot_be_split() {
        let config = ModuleConfig::default();
        let dispatcher = Dispatcher::new(&config);
        let mut kv = MemStore::new();
        dispatcher
            .dispatch(&mut kv, &Envelope::new("alice", 1, create("a1", None)))
            .unwrap();
        dispatcher
            .dispatch(
                &mut kv,
                &Envelope::new("alice", 2, Message::Finalize(Finalize { asset_id: "a1".into() })),
            )
            .unwrap();
        let before = kv.clone();

        for quantity in [1, 1_000] {
            assert!(matches!(
                dispatcher.dispatch(&mut kv, &Envelope::new("alice", 3, split("a2", "a1", quantity))),
                Err(AssetError::AssetAlreadyFinal { .. })
            ));
        }
        assert_eq!(kv, before);
    }

    #[test]
    fn child_creation_requires_owned_parent() {
        let config = ModuleConfig::default();
        let dispatcher = Dispatcher::new(&config);
        let mut kv = MemStore::new();
        dispatcher
            .dispatch(&mut kv, &Envelope::new("alice", 1, create("a1", None)))
            .unwrap();

        assert!(matches!(
            dispatcher.dispatch(&mut kv, &Envelope::new("bob", 1, create("b1", Some("a1")))),
            Err(AssetError::Unauthorized { .. })
        ));
        assert!(matches!(
            dispatcher.dispatch(&mut kv, &Envelope::new("bob", 1, create("b1", Some("zz")))),
            Err(AssetError::AssetNotFound { .. })
        ));
        assert!(matches!(
            dispatcher.dispatch(&mut kv, &Envelope::new("alice", 1, create("a1", None))),
            Err(AssetError::DuplicateAsset { .. })
        ));
    }

    #[test]
    fn failure_leaves_store_untouched() {
        let config = ModuleConfig::default();
        let dispatcher = Dispatcher::new(&config);
        let mut kv = MemStore::new();
        dispatcher
            .dispatch(&mut kv, &Envelope::new("alice", 1, create("a1", None)))
            .unwrap();
        let before = kv.clone();

        let err = dispatcher
            .dispatch(
                &mut kv,
                &Envelope::new(
                    "alice",
                    2,
                    Message::SubtractQuantity(SubtractQuantity {
                        asset_id: "a1".into(),
                        amount: BigUint::from(11u32),
                    }),
                ),
            )
            .unwrap_err();
        assert_eq!(err.code(), AssetError::InsufficientQuantity {
            id: "a1".into(),
            available: BigUint::from(10u32),
            requested: BigUint::from(11u32),
        }
        .code());
        assert_eq!(kv, before);
    }

    #[test]
    fn finalize_is_owner_only_and_one_way() {
        let config = ModuleConfig::default();
        let dispatcher = Dispatcher::new(&config);
        let mut kv = MemStore::new();
        dispatcher
            .dispatch(&mut kv, &Envelope::new("alice", 1, create("a1", None)))
            .unwrap();
        let fin = Message::Finalize(Finalize { asset_id: "a1".into() });

        assert!(matches!(
            dispatcher.dispatch(&mut kv, &Envelope::new("bob", 2, fin.clone())),
            Err(AssetError::Unauthorized { .. })
        ));
        dispatcher
            .dispatch(&mut kv, &Envelope::new("alice", 2, fin.clone()))
            .unwrap();
        assert!(matches!(
            dispatcher.dispatch(&mut kv, &Envelope::new("alice", 3, fin)),
            Err(AssetError::AssetAlreadyFinal { .. })
        ));
        assert!(matches!(
            dispatcher.dispatch(
                &mut kv,
                &Envelope::new(
                    "alice",
                    4,
                    Message::AddQuantity(AddQuantity {
                        asset_id: "a1".into(),
                        amount: BigUint::from(1u32),
                    }),
                ),
            ),
            Err(AssetError::AssetAlreadyFinal { .. })
        ));
    }

    #[test]
    fn invalid_sender_is_rejected_before_execution() {
        let config = ModuleConfig::default();
        let dispatcher = Dispatcher::new(&config);
        let mut kv = MemStore::new();
        assert!(matches!(
            dispatcher.dispatch(&mut kv, &Envelope::new("", 1, create("a1", None))),
            Err(AssetError::MissingField { field: "sender" })
        ));
        assert!(kv.is_empty());
    }
}
