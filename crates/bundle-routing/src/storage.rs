//! Per-node bundle storage
//!
//! Satellites have finite storage, counted as bytes held plus bytes already
//! committed in transit towards them. Target queues are unbounded.

use crate::BundleId;
use serde::{Deserialize, Serialize};

/// What happens when the next hop has no room for a bundle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoragePolicy {
    /// Keep the bundle at the sender and retry later
    #[default]
    Block,
    /// Drop the bundle with `DropReason::StorageOverflow`
    Drop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeQueue {
    /// `None` for unbounded queues
    capacity_bytes: Option<u64>,
    bundles: Vec<BundleId>,
    stored_bytes: u64,
    reserved_bytes: u64,
}

impl NodeQueue {
    pub fn bounded(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes: Some(capacity_bytes),
            ..Self::default()
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn capacity_bytes(&self) -> Option<u64> {
        self.capacity_bytes
    }

    pub fn stored_bytes(&self) -> u64 {
        self.stored_bytes
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.reserved_bytes
    }

    /// Stored plus inbound bytes
    pub fn used_bytes(&self) -> u64 {
        self.stored_bytes + self.reserved_bytes
    }

    /// Whether `size` more inbound bytes fit
    pub fn can_accept(&self, size: u64) -> bool {
        match self.capacity_bytes {
            Some(cap) => self.used_bytes() + size <= cap,
            None => true,
        }
    }

    pub fn reserve(&mut self, size: u64) {
        self.reserved_bytes += size;
    }

    /// Settle an inbound reservation once the bundle has arrived or vanished
    pub fn release_reservation(&mut self, size: u64) {
        self.reserved_bytes = self.reserved_bytes.saturating_sub(size);
    }

    pub fn push(&mut self, id: BundleId, size: u64) {
        self.bundles.push(id);
        self.stored_bytes += size;
    }

    /// Remove a bundle, returning whether it was present
    pub fn remove(&mut self, id: BundleId, size: u64) -> bool {
        match self.bundles.iter().position(|b| *b == id) {
            Some(pos) => {
                self.bundles.remove(pos);
                self.stored_bytes = self.stored_bytes.saturating_sub(size);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: BundleId) -> bool {
        self.bundles.contains(&id)
    }

    pub fn bundles(&self) -> &[BundleId] {
        &self.bundles
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}
