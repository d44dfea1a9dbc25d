//! Authorization predicates.
//!
//! Every function here is pure: it inspects an already-loaded [`Asset`] or
//! [`Proposal`] and answers "may this principal do this". Handlers turn a
//! `false` into [`AssetError::Unauthorized`](crate::AssetError::Unauthorized).

use crate::asset::Asset;
use crate::identity::AccountId;
use crate::proposal::{Proposal, Response};

pub fn is_owner(asset: &Asset, principal: &AccountId) -> bool {
    &asset.owner == principal
}

/// Owner, or a reporter whose grant contains `name`.
pub fn can_write_property(asset: &Asset, principal: &AccountId, name: &str) -> bool {
    is_owner(asset, principal)
        || asset
            .reporter(principal)
            .is_some_and(|reporter| reporter.can_write(name))
}

/// [`can_write_property`] for every name in the batch.
pub fn can_write_properties<'n>(
    asset: &Asset,
    principal: &AccountId,
    names: impl IntoIterator<Item = &'n str>,
) -> bool {
    names
        .into_iter()
        .all(|name| can_write_property(asset, principal, name))
}

/// Raw quantity changes (add/subtract/consume) are owner-only.
pub fn can_change_quantity(asset: &Asset, principal: &AccountId) -> bool {
    is_owner(asset, principal)
}

pub fn can_create_proposal(asset: &Asset, principal: &AccountId) -> bool {
    is_owner(asset, principal)
}

pub fn can_revoke_proposal(asset: &Asset, principal: &AccountId) -> bool {
    is_owner(asset, principal)
}

pub fn can_manage_reporters(asset: &Asset, principal: &AccountId) -> bool {
    is_owner(asset, principal)
}

pub fn can_finalize(asset: &Asset, principal: &AccountId) -> bool {
    is_owner(asset, principal)
}

/// Cancel belongs to the issuer; Accept and Reject belong to the recipient.
pub fn can_answer(proposal: &Proposal, respondent: &AccountId, response: Response) -> bool {
    match response {
        Response::Cancel => &proposal.issuer == respondent,
        Response::Accept | Response::Reject => &proposal.recipient == respondent,
    }
}

/// Whether the proposal's issuer still owns the asset. Acceptance of a
/// proposal from a since-replaced owner must not grant anything.
pub fn issuer_still_owns(asset: &Asset, proposal: &Proposal) -> bool {
    is_owner(asset, &proposal.issuer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::ProposalRole;
    use crate::reporter::Reporter;

    fn asset() -> Asset {
        let mut asset = Asset::new("a1", "Tea", "owner", 1u32, "kg");
        asset.upsert_reporter(Reporter::new("lab", ["grade"], 0));
        asset
    }

    #[test]
    fn property_write_rules() {
        let asset = asset();
        let owner = AccountId::from("owner");
        let lab = AccountId::from("lab");
        let other = AccountId::from("other");

        assert!(can_write_property(&asset, &owner, "anything"));
        assert!(can_write_property(&asset, &lab, "grade"));
        assert!(!can_write_property(&asset, &lab, "origin"));
        assert!(!can_write_property(&asset, &other, "grade"));

        assert!(can_write_properties(&asset, &lab, ["grade"]));
        assert!(!can_write_properties(&asset, &lab, ["grade", "origin"]));
    }

    #[test]
    fn owner_only_predicates() {
        let asset = asset();
        let lab = AccountId::from("lab");
        assert!(!can_change_quantity(&asset, &lab));
        assert!(!can_create_proposal(&asset, &lab));
        assert!(!can_manage_reporters(&asset, &lab));
        assert!(!can_finalize(&asset, &lab));
        assert!(can_revoke_proposal(&asset, &"owner".into()));
    }

    #[test]
    fn answer_rules() {
        let proposal = Proposal::pending(
            "a1".into(),
            "owner".into(),
            "bob".into(),
            ProposalRole::Reporter,
            vec!["grade".to_owned()],
        );
        let owner = AccountId::from("owner");
        let bob = AccountId::from("bob");

        assert!(can_answer(&proposal, &owner, Response::Cancel));
        assert!(!can_answer(&proposal, &owner, Response::Accept));
        assert!(can_answer(&proposal, &bob, Response::Accept));
        assert!(can_answer(&proposal, &bob, Response::Reject));
        assert!(!can_answer(&proposal, &bob, Response::Cancel));

        let mut transferred = asset();
        assert!(issuer_still_owns(&transferred, &proposal));
        transferred.owner = "carol".into();
        assert!(!issuer_still_owns(&transferred, &proposal));
    }
}
