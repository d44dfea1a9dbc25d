//! Store namespaces and key builders.
//!
//! Every record lives under a `provena/<namespace>/` prefix. Multi-part keys
//! join their segments with a NUL byte, which identifiers may not contain
//! (see [`validate_segment`](crate::identity::validate_segment)), so a prefix
//! ending in a separator never matches a longer identifier by accident and
//! keys sort by their first segment.

use crate::identity::{AccountId, AssetId};

/// Primary asset records: `asset/<asset>`.
pub const ASSET_NAMESPACE: &[u8] = b"provena/asset/";
/// Owner index: `owner_index/<owner>\0<asset>`.
pub const OWNER_INDEX_NAMESPACE: &[u8] = b"provena/owner_index/";
/// Reporter index: `reporter_index/<reporter>\0<asset>`.
pub const REPORTER_INDEX_NAMESPACE: &[u8] = b"provena/reporter_index/";
/// Pending proposals: `proposal/<asset>\0<recipient>`.
pub const PROPOSAL_NAMESPACE: &[u8] = b"provena/proposal/";
/// Pending proposals by recipient: `proposal_recipient/<recipient>\0<asset>`.
pub const PROPOSAL_RECIPIENT_NAMESPACE: &[u8] = b"provena/proposal_recipient/";
/// Asset properties: `property/<asset>\0<name>`.
pub const PROPERTY_NAMESPACE: &[u8] = b"provena/property/";
/// Inventory balances: `inventory/<owner>\0<root asset>`.
pub const INVENTORY_NAMESPACE: &[u8] = b"provena/inventory/";

/// Segment separator inside multi-part keys.
pub const SEPARATOR: u8 = 0;

fn namespaced(prefix: &[u8], segments: &[&str]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            key.push(SEPARATOR);
        }
        key.extend_from_slice(segment.as_bytes());
    }
    key
}

fn scoped(prefix: &[u8], first: &str) -> Vec<u8> {
    let mut key = namespaced(prefix, &[first]);
    key.push(SEPARATOR);
    key
}

pub fn asset_key(asset: &AssetId) -> Vec<u8> {
    namespaced(ASSET_NAMESPACE, &[asset.as_str()])
}

pub fn owner_index_key(owner: &AccountId, asset: &AssetId) -> Vec<u8> {
    namespaced(OWNER_INDEX_NAMESPACE, &[owner.as_str(), asset.as_str()])
}

pub fn owner_index_prefix(owner: &AccountId) -> Vec<u8> {
    scoped(OWNER_INDEX_NAMESPACE, owner.as_str())
}

pub fn reporter_index_key(reporter: &AccountId, asset: &AssetId) -> Vec<u8> {
    namespaced(REPORTER_INDEX_NAMESPACE, &[reporter.as_str(), asset.as_str()])
}

pub fn reporter_index_prefix(reporter: &AccountId) -> Vec<u8> {
    scoped(REPORTER_INDEX_NAMESPACE, reporter.as_str())
}

pub fn proposal_key(asset: &AssetId, recipient: &AccountId) -> Vec<u8> {
    namespaced(PROPOSAL_NAMESPACE, &[asset.as_str(), recipient.as_str()])
}

pub fn proposal_prefix(asset: &AssetId) -> Vec<u8> {
    scoped(PROPOSAL_NAMESPACE, asset.as_str())
}

pub fn proposal_recipient_key(recipient: &AccountId, asset: &AssetId) -> Vec<u8> {
    namespaced(PROPOSAL_RECIPIENT_NAMESPACE, &[recipient.as_str(), asset.as_str()])
}

pub fn proposal_recipient_prefix(recipient: &AccountId) -> Vec<u8> {
    scoped(PROPOSAL_RECIPIENT_NAMESPACE, recipient.as_str())
}

pub fn property_key(asset: &AssetId, name: &str) -> Vec<u8> {
    namespaced(PROPERTY_NAMESPACE, &[asset.as_str(), name])
}

pub fn property_prefix(asset: &AssetId) -> Vec<u8> {
    scoped(PROPERTY_NAMESPACE, asset.as_str())
}

pub fn inventory_key(owner: &AccountId, root: &AssetId) -> Vec<u8> {
    namespaced(INVENTORY_NAMESPACE, &[owner.as_str(), root.as_str()])
}

pub fn inventory_prefix(owner: &AccountId) -> Vec<u8> {
    scoped(INVENTORY_NAMESPACE, owner.as_str())
}

/// Split a key under `namespace` back into its segments.
///
/// Returns `None` if the key is outside the namespace or not valid UTF-8.
pub fn split_segments<'k>(namespace: &[u8], key: &'k [u8]) -> Option<Vec<&'k str>> {
    let rest = key.strip_prefix(namespace)?;
    rest.split(|b| *b == SEPARATOR)
        .map(|segment| std::str::from_utf8(segment).ok())
        .collect()
}

/// Printable rendering of a raw key for errors and logs.
pub fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).replace('\0', "|")
}
