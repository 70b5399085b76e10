//! In-memory index of already-persisted record keys
//!
//! The index is loaded once per site at the start of a run and is never
//! refreshed from the store mid-run. Keys marked during the run only affect
//! this run. Two runs started concurrently against the same store can both
//! miss each other's writes and double-persist; the store's uniqueness
//! constraint is the backstop for that race.

use crate::state::CompositeKey;
use crate::storage::{KeySource, RecordKind, SinkBinding, StorageResult};
use std::collections::HashSet;

/// Set of known keys, split by record namespace
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    listings: HashSet<CompositeKey>,
    details: HashSet<CompositeKey>,
}

impl DedupIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every persisted key for the collections named by `binding`
    ///
    /// # Arguments
    ///
    /// * `store` - Read side of the persisted store
    /// * `binding` - Which listing/detail collections belong to this site
    pub fn load<S>(store: &S, binding: &SinkBinding) -> StorageResult<Self>
    where
        S: KeySource + ?Sized,
    {
        let listings: HashSet<CompositeKey> = store
            .listing_keys(&binding.listings_collection)?
            .into_iter()
            .collect();
        let details: HashSet<CompositeKey> = store
            .detail_keys(&binding.details_collection)?
            .into_iter()
            .collect();

        tracing::debug!(
            "Dedup index loaded: {} listing keys from {}, {} detail keys from {}",
            listings.len(),
            binding.listings_collection,
            details.len(),
            binding.details_collection
        );

        Ok(Self { listings, details })
    }

    /// Returns true if `key` is known in the given namespace
    pub fn contains(&self, kind: RecordKind, key: &CompositeKey) -> bool {
        self.namespace(kind).contains(key)
    }

    /// Records `key` as seen; returns false if it was already known
    pub fn mark_seen(&mut self, kind: RecordKind, key: CompositeKey) -> bool {
        match kind {
            RecordKind::Listing => self.listings.insert(key),
            RecordKind::Detail => self.details.insert(key),
        }
    }

    /// Number of keys known in a namespace
    pub fn len(&self, kind: RecordKind) -> usize {
        self.namespace(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty() && self.details.is_empty()
    }

    fn namespace(&self, kind: RecordKind) -> &HashSet<CompositeKey> {
        match kind {
            RecordKind::Listing => &self.listings,
            RecordKind::Detail => &self.details,
        }
    }
}
