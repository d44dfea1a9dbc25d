//! Provena Core -- asset ownership and provenance state machine.
//!
//! Assets are created by an account, split into child assets, consumed into
//! other assets as materials, annotated with typed properties, and handed
//! between custodians through a two-party proposal protocol. Delegated
//! reporters may write a restricted set of properties on an asset they do not
//! own.
//!
//! All state lives in a [`KvStore`](store::KvStore). Every change goes through
//! the [`Dispatcher`](dispatch::Dispatcher), which applies one
//! [`Envelope`](message::Envelope) at a time and commits it atomically.
//!
//! # Quick Start
//!
//! ```
//! use provena_core::prelude::*;
//!
//! let config = ModuleConfig::default();
//! let dispatcher = Dispatcher::new(&config);
//! let mut kv = MemStore::new();
//!
//! let create = Message::from_json(
//!     r#"{"type":"create_asset","id":"a1","name":"Wheat","quantity":"100","unit":"kg"}"#,
//! ).unwrap();
//! dispatcher.dispatch(&mut kv, &Envelope::new("farmer", 1, create)).unwrap();
//!
//! let wheat = Queries::new(&kv).asset(&AssetId::from("a1")).unwrap().unwrap();
//! assert_eq!(wheat.owner, AccountId::from("farmer"));
//! ```

#![deny(unsafe_code)]

pub mod asset;
pub mod asset_store;
pub mod auth;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod identity;
pub mod keys;
pub mod ledger;
pub mod message;
pub mod property;
pub mod proposal;
pub mod query;
pub mod reconcile;
pub mod reporter;
pub mod store;

use num_bigint::BigUint;

use crate::identity::{AccountId, AssetId};
use crate::proposal::ProposalRole;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by asset operations.
///
/// Every variant maps to a stable numeric [`code`](AssetError::code).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    /// A required field is empty or absent.
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    /// A field is present but malformed or out of range.
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The principal may not perform the action on the asset.
    #[error("{principal} is not authorized to {action} on asset {asset}")]
    Unauthorized {
        principal: AccountId,
        action: &'static str,
        asset: AssetId,
    },

    #[error("asset {id} not found")]
    AssetNotFound { id: AssetId },

    #[error("component asset {id} not found")]
    ComponentAssetNotFound { id: AssetId },

    #[error("no pending proposal on asset {asset} for {recipient}")]
    ProposalNotFound { asset: AssetId, recipient: AccountId },

    /// The asset is frozen; no further mutations are accepted.
    #[error("asset {id} is final")]
    AssetAlreadyFinal { id: AssetId },

    /// `id` is an asset or, for inventory checks, a root denomination.
    #[error("insufficient quantity of {id}: {available} available, {requested} requested")]
    InsufficientQuantity {
        id: AssetId,
        available: BigUint,
        requested: BigUint,
    },

    #[error("asset {id} already exists")]
    DuplicateAsset { id: AssetId },

    #[error("{reporter} is not a reporter of asset {asset}")]
    InvalidRevokeReporter { asset: AssetId, reporter: AccountId },

    /// Names can only be revoked from reporter-role proposals.
    #[error("proposal on asset {asset} for {recipient} has role {role}; cannot revoke names")]
    InvalidRevokeRecipient {
        asset: AssetId,
        recipient: AccountId,
        role: ProposalRole,
    },

    /// Stored bytes could not be encoded or decoded.
    #[error("record codec failure at '{key}': {details}")]
    Codec { key: String, details: String },
}

impl AssetError {
    /// Stable numeric code for this failure, reported with the module's
    /// codespace.
    pub fn code(&self) -> u32 {
        match self {
            AssetError::MissingField { .. } => 2,
            AssetError::InvalidField { .. } => 3,
            AssetError::Unauthorized { .. } => 4,
            AssetError::AssetNotFound { .. } => 5,
            AssetError::ComponentAssetNotFound { .. } => 6,
            AssetError::ProposalNotFound { .. } => 7,
            AssetError::AssetAlreadyFinal { .. } => 8,
            AssetError::InsufficientQuantity { .. } => 9,
            AssetError::DuplicateAsset { .. } => 10,
            AssetError::InvalidRevokeReporter { .. } => 11,
            AssetError::InvalidRevokeRecipient { .. } => 12,
            AssetError::Codec { .. } => 13,
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::asset::{Asset, Material};
    pub use crate::asset_store::AssetStore;
    pub use crate::config::{Limits, ModuleConfig};
    pub use crate::dispatch::Dispatcher;
    pub use crate::identity::{AccountId, AssetId};
    pub use crate::ledger::MaterialLedger;
    pub use crate::message::{Envelope, IndexTag, Message, MessageKind, Outcome};
    pub use crate::property::{Property, PropertyKind, PropertyStore, PropertyValue};
    pub use crate::proposal::{
        Answer, Proposal, ProposalEngine, ProposalRole, ProposalStatus, Response,
    };
    pub use crate::query::Queries;
    pub use crate::reconcile::{verify_indices, verify_inventory, IndexIssue, InventoryIssue};
    pub use crate::reporter::{Reporter, ReporterRegistry};
    pub use crate::store::{CacheStore, KvStore, MemStore};
    pub use crate::AssetError;
}

// ---------------------------------------------------------------------------
// Scenario Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::message::*;
    use crate::prelude::*;
    use num_bigint::BigUint;

    struct Chain {
        config: ModuleConfig,
        kv: MemStore,
        time: u64,
    }

    impl Chain {
        fn new() -> Self {
            Self {
                config: ModuleConfig::default(),
                kv: MemStore::new(),
                time: 0,
            }
        }

        fn send(&mut self, sender: &str, message: Message) -> Result<Outcome, AssetError> {
            self.time += 1;
            Dispatcher::new(&self.config).dispatch(
                &mut self.kv,
                &Envelope::new(sender, self.time, message),
            )
        }

        fn asset(&self, id: &str) -> Asset {
            Queries::new(&self.kv).asset(&id.into()).unwrap().unwrap()
        }
    }

    fn create(id: &str, qty: u32) -> Message {
        Message::CreateAsset(CreateAsset {
            id: id.into(),
            name: id.to_owned(),
            quantity: BigUint::from(qty),
            unit: "kg".to_owned(),
            parent_id: None,
            properties: Vec::new(),
        })
    }

    fn add(id: &str, amount: u32) -> Message {
        Message::AddQuantity(AddQuantity {
            asset_id: id.into(),
            amount: BigUint::from(amount),
        })
    }

    fn subtract(id: &str, amount: u32) -> Message {
        Message::SubtractQuantity(SubtractQuantity {
            asset_id: id.into(),
            amount: BigUint::from(amount),
        })
    }

    fn propose(id: &str, to: &str, role: ProposalRole, names: &[&str]) -> Message {
        Message::CreateProposal(CreateProposal {
            asset_id: id.into(),
            recipient: to.into(),
            role,
            property_names: names.iter().map(|n| n.to_string()).collect(),
        })
    }

    fn answer(id: &str, recipient: &str, response: Response) -> Message {
        Message::AnswerProposal(AnswerProposal {
            asset_id: id.into(),
            recipient: recipient.into(),
            response,
        })
    }

    // -- quantity scenarios -------------------------------------------------

    #[test]
    fn add_then_oversubtract() {
        let mut chain = Chain::new();
        chain.send("farmer", create("a1", 100)).unwrap();
        chain.send("farmer", add("a1", 50)).unwrap();
        assert_eq!(chain.asset("a1").quantity, BigUint::from(150u32));

        let err = chain.send("farmer", subtract("a1", 200)).unwrap_err();
        assert!(matches!(err, AssetError::InsufficientQuantity { .. }));
        assert_eq!(chain.asset("a1").quantity, BigUint::from(150u32));
    }

    #[test]
    fn materials_over_available_leave_both_assets_unmodified() {
        let mut chain = Chain::new();
        chain.send("maker", create("a1", 5)).unwrap();
        chain.send("maker", create("a2", 1)).unwrap();
        let (a1, a2) = (chain.asset("a1"), chain.asset("a2"));

        let err = chain
            .send(
                "maker",
                Message::AddMaterials(AddMaterials {
                    asset_id: "a2".into(),
                    materials: vec![Material::new("a1", 10u32)],
                }),
            )
            .unwrap_err();
        assert!(matches!(err, AssetError::InsufficientQuantity { .. }));
        assert_eq!(chain.asset("a1"), a1);
        assert_eq!(chain.asset("a2"), a2);
    }

    // -- proposal scenarios -------------------------------------------------

    #[test]
    fn reporter_then_owner_handoff() {
        let mut chain = Chain::new();
        chain.send("owner", create("a1", 1)).unwrap();

        chain
            .send("owner", propose("a1", "r", ProposalRole::Reporter, &["size"]))
            .unwrap();
        let outcome = chain.send("r", answer("a1", "r", Response::Accept)).unwrap();
        assert_eq!(outcome.tag("status"), Some("accepted"));
        assert_eq!(outcome.tag("recipient"), Some("r"));
        let reporters = chain.asset("a1").reporters;
        assert_eq!(reporters.len(), 1);
        assert_eq!(reporters[0].account, AccountId::from("r"));
        assert_eq!(reporters[0].properties, vec!["size".to_owned()]);

        chain
            .send("owner", propose("a1", "r2", ProposalRole::Owner, &[]))
            .unwrap();
        chain.send("r2", answer("a1", "r2", Response::Accept)).unwrap();
        let asset = chain.asset("a1");
        assert_eq!(asset.owner, AccountId::from("r2"));
        assert!(asset.reporters.is_empty());
        assert!(verify_indices(&chain.kv).unwrap().is_empty());
        assert!(verify_inventory(&chain.kv).unwrap().is_empty());
    }

    #[test]
    fn reporter_writes_only_granted_names() {
        let mut chain = Chain::new();
        chain.send("owner", create("a1", 1)).unwrap();
        chain
            .send(
                "owner",
                Message::CreateReporter(CreateReporter {
                    asset_id: "a1".into(),
                    reporter: "lab".into(),
                    property_names: vec!["grade".to_owned()],
                }),
            )
            .unwrap();

        let write = |names: &[&str]| {
            Message::UpdateProperties(UpdateProperties {
                asset_id: "a1".into(),
                properties: names
                    .iter()
                    .map(|n| Property::new(*n, PropertyValue::String("x".to_owned())))
                    .collect(),
            })
        };
        chain.send("lab", write(&["grade"])).unwrap();
        assert!(matches!(
            chain.send("lab", write(&["grade", "origin"])),
            Err(AssetError::Unauthorized { .. })
        ));
        assert_eq!(chain.asset("a1").properties.len(), 1);

        chain
            .send(
                "owner",
                Message::RevokeReporter(RevokeReporter {
                    asset_id: "a1".into(),
                    reporter: "lab".into(),
                }),
            )
            .unwrap();
        assert!(chain.asset("a1").reporters.is_empty());
        assert!(Queries::new(&chain.kv)
            .assets_by_reporter(&"lab".into())
            .unwrap()
            .is_empty());
    }

    // -- finality -----------------------------------------------------------

    #[test]
    fn final_assets_reject_every_mutation() {
        let mut chain = Chain::new();
        chain.send("owner", create("a1", 3)).unwrap();
        chain.send("owner", create("c", 3)).unwrap();
        chain
            .send(
                "owner",
                Message::Finalize(Finalize {
                    asset_id: "a1".into(),
                }),
            )
            .unwrap();

        let attempts = vec![
            add("a1", 1),
            subtract("a1", 1),
            Message::AddMaterials(AddMaterials {
                asset_id: "a1".into(),
                materials: vec![Material::new("c", 1u32)],
            }),
            Message::UpdateProperties(UpdateProperties {
                asset_id: "a1".into(),
                properties: vec![Property::new("k", PropertyValue::Boolean(true))],
            }),
            propose("a1", "bob", ProposalRole::Owner, &[]),
            Message::Finalize(Finalize {
                asset_id: "a1".into(),
            }),
        ];
        for message in attempts {
            let kind = message.kind();
            assert!(
                matches!(chain.send("owner", message), Err(AssetError::AssetAlreadyFinal { .. })),
                "{kind} should fail on a final asset"
            );
        }
    }

    #[test]
    fn error_codes_are_distinct() {
        let errors = [
            AssetError::MissingField { field: "f" },
            AssetError::InvalidField {
                field: "f",
                reason: String::new(),
            },
            AssetError::Unauthorized {
                principal: "p".into(),
                action: "a",
                asset: "x".into(),
            },
            AssetError::AssetNotFound { id: "x".into() },
            AssetError::ComponentAssetNotFound { id: "x".into() },
            AssetError::ProposalNotFound {
                asset: "x".into(),
                recipient: "r".into(),
            },
            AssetError::AssetAlreadyFinal { id: "x".into() },
            AssetError::InsufficientQuantity {
                id: "x".into(),
                available: BigUint::from(0u32),
                requested: BigUint::from(1u32),
            },
            AssetError::DuplicateAsset { id: "x".into() },
            AssetError::InvalidRevokeReporter {
                asset: "x".into(),
                reporter: "r".into(),
            },
            AssetError::InvalidRevokeRecipient {
                asset: "x".into(),
                recipient: "r".into(),
                role: ProposalRole::Owner,
            },
            AssetError::Codec {
                key: String::new(),
                details: String::new(),
            },
        ];
        let mut codes: Vec<u32> = errors.iter().map(AssetError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
