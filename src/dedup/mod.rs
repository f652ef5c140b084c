//! Multi-key duplicate detection
//!
//! A deal is a repost when any one of its keys has been seen before: the
//! rendered content, the normalized link, the platform product id or the
//! product name. Keys that cannot be derived do not take part.

use crate::ingester::render::PLACEHOLDER_NAME;
use crate::types::Deal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Keys derived from one deal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKeySet {
    pub content_hash: String,
    pub normalized_url: String,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
}

impl DedupKeySet {
    pub fn from_deal(deal: &Deal) -> Self {
        Self {
            content_hash: content_hash(&deal.body),
            normalized_url: deal.url.clone(),
            product_id: deal.product_id.clone(),
            product_name: normalize_name(&deal.product_name),
        }
    }
}

/// SHA-256 hex of the post body. Hashtags rotate, so they are left out.
pub fn content_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.trim().as_bytes()))
}

/// Lowercased, whitespace-collapsed name; `None` for the placeholder
fn normalize_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() || name == PLACEHOLDER_NAME {
        return None;
    }
    Some(
        name.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    )
}

/// Serializable copy of the index for an external store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupSnapshot {
    pub content_hashes: Vec<String>,
    pub urls: Vec<String>,
    pub product_ids: Vec<String>,
    pub product_names: Vec<String>,
}

/// Set sizes, for the status surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupSizes {
    pub content_hashes: usize,
    pub urls: usize,
    pub product_ids: usize,
    pub product_names: usize,
}

/// Every key ever committed. Grows without bound.
#[derive(Debug, Default)]
pub struct DedupIndex {
    content_hashes: HashSet<String>,
    urls: HashSet<String>,
    product_ids: HashSet<String>,
    product_names: HashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_duplicate(&self, deal: &Deal) -> bool {
        self.matches(&DedupKeySet::from_deal(deal))
    }

    pub fn matches(&self, keys: &DedupKeySet) -> bool {
        self.content_hashes.contains(&keys.content_hash)
            || self.urls.contains(&keys.normalized_url)
            || keys
                .product_id
                .as_ref()
                .is_some_and(|id| self.product_ids.contains(id))
            || keys
                .product_name
                .as_ref()
                .is_some_and(|name| self.product_names.contains(name))
    }

    /// Record all present keys of a delivered deal
    pub fn commit(&mut self, deal: &Deal) {
        let keys = DedupKeySet::from_deal(deal);
        self.content_hashes.insert(keys.content_hash);
        self.urls.insert(keys.normalized_url);
        if let Some(id) = keys.product_id {
            self.product_ids.insert(id);
        }
        if let Some(name) = keys.product_name {
            self.product_names.insert(name);
        }
    }

    pub fn len(&self) -> usize {
        self.content_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content_hashes.is_empty()
    }

    pub fn sizes(&self) -> DedupSizes {
        DedupSizes {
            content_hashes: self.content_hashes.len(),
            urls: self.urls.len(),
            product_ids: self.product_ids.len(),
            product_names: self.product_names.len(),
        }
    }

    pub fn snapshot(&self) -> DedupSnapshot {
        fn sorted(set: &HashSet<String>) -> Vec<String> {
            let mut v: Vec<String> = set.iter().cloned().collect();
            v.sort();
            v
        }
        DedupSnapshot {
            content_hashes: sorted(&self.content_hashes),
            urls: sorted(&self.urls),
            product_ids: sorted(&self.product_ids),
            product_names: sorted(&self.product_names),
        }
    }

    pub fn from_snapshot(snapshot: DedupSnapshot) -> Self {
        Self {
            content_hashes: snapshot.content_hashes.into_iter().collect(),
            urls: snapshot.urls.into_iter().collect(),
            product_ids: snapshot.product_ids.into_iter().collect(),
            product_names: snapshot.product_names.into_iter().collect(),
        }
    }
}
