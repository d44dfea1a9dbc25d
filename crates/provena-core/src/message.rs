//! The closed set of messages the module accepts, and their outcomes.
//!
//! A [`Message`] is one of eleven kinds, each carried in an [`Envelope`] that
//! names the authenticated sender and the block time. On the wire a message is
//! a JSON object whose `type` field selects the kind:
//!
//! ```
//! use provena_core::message::{Message, MessageKind};
//!
//! let msg = Message::from_json(
//!     r#"{"type": "add_quantity", "asset_id": "a1", "amount": "50"}"#,
//! ).unwrap();
//! assert_eq!(msg.kind(), MessageKind::AddQuantity);
//! ```
//!
//! [`Message::validate`] performs the stateless checks (required fields,
//! identifier shape, size limits) before any handler runs.

use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::asset::Material;
use crate::config::Limits;
use crate::identity::{validate_segment, AccountId, AssetId};
use crate::property::Property;
use crate::proposal::{ProposalRole, Response};
use crate::AssetError;

// ---------------------------------------------------------------------------
// Message payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAsset {
    pub id: AssetId,
    pub name: String,
    #[serde(with = "crate::codec::decimal")]
    pub quantity: BigUint,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<AssetId>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddQuantity {
    pub asset_id: AssetId,
    #[serde(with = "crate::codec::decimal")]
    pub amount: BigUint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtractQuantity {
    pub asset_id: AssetId,
    #[serde(with = "crate::codec::decimal")]
    pub amount: BigUint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMaterials {
    pub asset_id: AssetId,
    pub materials: Vec<Material>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProperties {
    pub asset_id: AssetId,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finalize {
    pub asset_id: AssetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProposal {
    pub asset_id: AssetId,
    pub recipient: AccountId,
    pub role: ProposalRole,
    #[serde(default)]
    pub property_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerProposal {
    pub asset_id: AssetId,
    pub recipient: AccountId,
    pub response: Response,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeProposal {
    pub asset_id: AssetId,
    pub recipient: AccountId,
    #[serde(default)]
    pub property_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReporter {
    pub asset_id: AssetId,
    pub reporter: AccountId,
    #[serde(default)]
    pub property_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeReporter {
    pub asset_id: AssetId,
    pub reporter: AccountId,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Every message the module handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    CreateAsset(CreateAsset),
    AddQuantity(AddQuantity),
    SubtractQuantity(SubtractQuantity),
    AddMaterials(AddMaterials),
    UpdateProperties(UpdateProperties),
    Finalize(Finalize),
    CreateProposal(CreateProposal),
    AnswerProposal(AnswerProposal),
    RevokeProposal(RevokeProposal),
    CreateReporter(CreateReporter),
    RevokeReporter(RevokeReporter),
}

/// The kind of a [`Message`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    CreateAsset,
    AddQuantity,
    SubtractQuantity,
    AddMaterials,
    UpdateProperties,
    Finalize,
    CreateProposal,
    AnswerProposal,
    RevokeProposal,
    CreateReporter,
    RevokeReporter,
}

impl MessageKind {
    pub const ALL: [MessageKind; 11] = [
        MessageKind::CreateAsset,
        MessageKind::AddQuantity,
        MessageKind::SubtractQuantity,
        MessageKind::AddMaterials,
        MessageKind::UpdateProperties,
        MessageKind::Finalize,
        MessageKind::CreateProposal,
        MessageKind::AnswerProposal,
        MessageKind::RevokeProposal,
        MessageKind::CreateReporter,
        MessageKind::RevokeReporter,
    ];

    /// The wire label, also used as the `action` outcome tag.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::CreateAsset => "create_asset",
            MessageKind::AddQuantity => "add_quantity",
            MessageKind::SubtractQuantity => "subtract_quantity",
            MessageKind::AddMaterials => "add_materials",
            MessageKind::UpdateProperties => "update_properties",
            MessageKind::Finalize => "finalize",
            MessageKind::CreateProposal => "create_proposal",
            MessageKind::AnswerProposal => "answer_proposal",
            MessageKind::RevokeProposal => "revoke_proposal",
            MessageKind::CreateReporter => "create_reporter",
            MessageKind::RevokeReporter => "revoke_reporter",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    /// Parse a message from its JSON wire form. Any decoding failure,
    /// including an unknown role or response label, is `InvalidField`.
    pub fn from_json(json: &str) -> Result<Self, AssetError> {
        serde_json::from_str(json).map_err(|e| AssetError::InvalidField {
            field: "message",
            reason: e.to_string(),
        })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::CreateAsset(_) => MessageKind::CreateAsset,
            Message::AddQuantity(_) => MessageKind::AddQuantity,
            Message::SubtractQuantity(_) => MessageKind::SubtractQuantity,
            Message::AddMaterials(_) => MessageKind::AddMaterials,
            Message::UpdateProperties(_) => MessageKind::UpdateProperties,
            Message::Finalize(_) => MessageKind::Finalize,
            Message::CreateProposal(_) => MessageKind::CreateProposal,
            Message::AnswerProposal(_) => MessageKind::AnswerProposal,
            Message::RevokeProposal(_) => MessageKind::RevokeProposal,
            Message::CreateReporter(_) => MessageKind::CreateReporter,
            Message::RevokeReporter(_) => MessageKind::RevokeReporter,
        }
    }

    /// The asset the message targets.
    pub fn asset_id(&self) -> &AssetId {
        match self {
            Message::CreateAsset(m) => &m.id,
            Message::AddQuantity(m) => &m.asset_id,
            Message::SubtractQuantity(m) => &m.asset_id,
            Message::AddMaterials(m) => &m.asset_id,
            Message::UpdateProperties(m) => &m.asset_id,
            Message::Finalize(m) => &m.asset_id,
            Message::CreateProposal(m) => &m.asset_id,
            Message::AnswerProposal(m) => &m.asset_id,
            Message::RevokeProposal(m) => &m.asset_id,
            Message::CreateReporter(m) => &m.asset_id,
            Message::RevokeReporter(m) => &m.asset_id,
        }
    }

    /// The counterparty account, for kinds that name one.
    pub fn counterparty(&self) -> Option<&AccountId> {
        match self {
            Message::CreateProposal(m) => Some(&m.recipient),
            Message::AnswerProposal(m) => Some(&m.recipient),
            Message::RevokeProposal(m) => Some(&m.recipient),
            Message::CreateReporter(m) => Some(&m.reporter),
            Message::RevokeReporter(m) => Some(&m.reporter),
            _ => None,
        }
    }

    /// Stateless validation: required fields present, identifiers usable as
    /// key segments, and collection sizes within `limits`.
    pub fn validate(&self, limits: &Limits) -> Result<(), AssetError> {
        let id_field = match self {
            Message::CreateAsset(_) => "id",
            _ => "asset_id",
        };
        validate_segment(id_field, self.asset_id().as_str(), limits.max_id_len)?;
        if let Some(account) = self.counterparty() {
            let field = match self {
                Message::CreateReporter(_) | Message::RevokeReporter(_) => "reporter",
                _ => "recipient",
            };
            validate_segment(field, account.as_str(), limits.max_id_len)?;
        }

        match self {
            Message::CreateAsset(m) => {
                validate_segment("name", &m.name, limits.max_name_len)?;
                validate_segment("unit", &m.unit, limits.max_name_len)?;
                if let Some(parent) = &m.parent_id {
                    validate_segment("parent_id", parent.as_str(), limits.max_id_len)?;
                    if parent == &m.id {
                        return Err(AssetError::InvalidField {
                            field: "parent_id",
                            reason: "an asset cannot be its own parent".to_owned(),
                        });
                    }
                }
                validate_properties(&m.properties, limits)
            }
            Message::UpdateProperties(m) => validate_properties(&m.properties, limits),
            Message::AddMaterials(m) => {
                Limits::check_count("materials", m.materials.len(), limits.max_materials)?;
                for material in &m.materials {
                    validate_segment(
                        "component_id",
                        material.component_id.as_str(),
                        limits.max_id_len,
                    )?;
                }
                Ok(())
            }
            Message::CreateProposal(m) => validate_names(&m.property_names, limits),
            Message::RevokeProposal(m) => validate_names(&m.property_names, limits),
            Message::CreateReporter(m) => validate_names(&m.property_names, limits),
            Message::AddQuantity(_)
            | Message::SubtractQuantity(_)
            | Message::Finalize(_)
            | Message::AnswerProposal(_)
            | Message::RevokeReporter(_) => Ok(()),
        }
    }
}

fn validate_properties(properties: &[Property], limits: &Limits) -> Result<(), AssetError> {
    Limits::check_count("properties", properties.len(), limits.max_properties)?;
    for property in properties {
        validate_segment("property_name", &property.name, limits.max_name_len)?;
        property.value.validate()?;
    }
    Ok(())
}

fn validate_names(names: &[String], limits: &Limits) -> Result<(), AssetError> {
    Limits::check_count("property_names", names.len(), limits.max_property_names)?;
    for name in names {
        validate_segment("property_name", name, limits.max_name_len)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A message together with its authenticated sender and block time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: AccountId,
    /// Time of the block carrying the message. The only clock handlers see.
    pub block_time: u64,
    pub message: Message,
}

impl Envelope {
    pub fn new(sender: impl Into<AccountId>, block_time: u64, message: Message) -> Self {
        Self {
            sender: sender.into(),
            block_time,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A key/value pair emitted with a successful message for external indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTag {
    pub key: String,
    pub value: String,
}

/// The success result of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: MessageKind,
    pub tags: Vec<IndexTag>,
}

impl Outcome {
    /// An outcome tagged with `action`, `asset_id` and `sender`.
    pub fn new(kind: MessageKind, asset_id: &AssetId, sender: &AccountId) -> Self {
        Self { kind, tags: Vec::new() }
            .with_tag("action", kind.as_str())
            .with_tag("asset_id", asset_id.as_str())
            .with_tag("sender", sender.as_str())
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(IndexTag {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// The value of the first tag named `key`.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyValue;

    #[test]
    fn parses_create_asset_with_defaults() {
        let msg = Message::from_json(
            r#"{"type":"create_asset","id":"a1","name":"Wheat","quantity":100,"unit":"kg"}"#,
        )
        .unwrap();
        match msg {
            Message::CreateAsset(m) => {
                assert_eq!(m.quantity, BigUint::from(100u32));
                assert_eq!(m.parent_id, None);
                assert!(m.properties.is_empty());
            }
            other => panic!("expected CreateAsset, got {other:?}"),
        }
    }

    #[test]
    fn unknown_labels_are_invalid_field() {
        for json in [
            r#"{"type":"create_proposal","asset_id":"a","recipient":"b","role":"auditor"}"#,
            r#"{"type":"answer_proposal","asset_id":"a","recipient":"b","response":"maybe"}"#,
            r#"{"type":"teleport","asset_id":"a"}"#,
        ] {
            assert!(matches!(
                Message::from_json(json),
                Err(AssetError::InvalidField { field: "message", .. })
            ));
        }
    }

    #[test]
    fn kinds_round_trip_their_labels() {
        for kind in MessageKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn validate_checks_identifiers_and_limits() {
        let limits = Limits {
            max_properties: 1,
            ..Limits::default()
        };
        let empty_id = Message::Finalize(Finalize {
            asset_id: AssetId::new(""),
        });
        assert!(matches!(
            empty_id.validate(&limits),
            Err(AssetError::MissingField { field: "asset_id" })
        ));

        let too_many = Message::UpdateProperties(UpdateProperties {
            asset_id: "a1".into(),
            properties: vec![
                Property::new("a", PropertyValue::Boolean(true)),
                Property::new("b", PropertyValue::Boolean(false)),
            ],
        });
        assert!(matches!(
            too_many.validate(&limits),
            Err(AssetError::InvalidField { field: "properties", .. })
        ));

        let own_parent = Message::CreateAsset(CreateAsset {
            id: "a1".into(),
            name: "x".to_owned(),
            quantity: BigUint::from(1u32),
            unit: "u".to_owned(),
            parent_id: Some("a1".into()),
            properties: Vec::new(),
        });
        assert!(matches!(
            own_parent.validate(&limits),
            Err(AssetError::InvalidField { field: "parent_id", .. })
        ));
    }

    #[test]
    fn outcome_tags() {
        let outcome = Outcome::new(MessageKind::Finalize, &"a1".into(), &"alice".into())
            .with_tag("status", "accepted");
        assert_eq!(outcome.tag("action"), Some("finalize"));
        assert_eq!(outcome.tag("asset_id"), Some("a1"));
        assert_eq!(outcome.tag("sender"), Some("alice"));
        assert_eq!(outcome.tag("status"), Some("accepted"));
        assert_eq!(outcome.tag("recipient"), None);
    }
}
