//! Bundle Routing Library
//!
//! Store-and-forward routing of DTN bundles across the contact graph:
//! generation at targets, per-hop earliest-arrival planning, capacity
//! constrained admission onto contact windows, lifetime expiry and
//! delivery at gateways.

use contact_graph::ContactError;
use orbital_mechanics::NodeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

pub mod generator;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod transmission;

pub use generator::{ArrivalProcess, BundleGenerator, BundleProfile, ValueSpec};
pub use scheduler::{NetworkState, Scheduler, SchedulerConfig};
pub use stats::SimulationStats;
pub use storage::{NodeQueue, StoragePolicy};
pub use transmission::{TransmissionEvent, WindowLedger};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error(transparent)]
    Contact(#[from] ContactError),
    #[error("Bundle not found: {0}")]
    UnknownBundle(BundleId),
    #[error("No queue for node {0}")]
    NoQueue(NodeId),
    #[error("Bundle {0} is owned by {1} places")]
    OwnershipViolation(BundleId, usize),
    #[error("Invalid bundle parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, RoutingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BundleId(pub u64);

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    pub id: BundleId,
    /// Target that generated the bundle
    pub source: NodeId,
    pub created_at: f64,
    pub size_bytes: u64,
    pub lifetime_s: f64,
    pub priority: i32,
}

impl Bundle {
    pub fn expires_at(&self) -> f64 {
        self.created_at + self.lifetime_s
    }

    pub fn remaining_lifetime(&self, now: f64) -> f64 {
        self.expires_at() - now
    }

    pub fn is_expired(&self, now: f64) -> bool {
        self.remaining_lifetime(now) <= 0.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NoRoute,
    StorageOverflow,
    HorizonEnd,
}

/// Where a bundle is, or how it ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BundleState {
    /// Generated, creation time not yet reached
    Pending,
    Queued {
        node: NodeId,
    },
    InTransit {
        window: usize,
        from: NodeId,
        to: NodeId,
        finish: f64,
    },
    Delivered {
        gateway: NodeId,
        at: f64,
        latency: f64,
    },
    Expired {
        at: f64,
    },
    Dropped {
        at: f64,
        reason: DropReason,
    },
}

impl BundleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BundleState::Delivered { .. } | BundleState::Expired { .. } | BundleState::Dropped { .. }
        )
    }
}

/// Admission order among bundles competing for one window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriorityOrder {
    #[default]
    HigherFirst,
    LowerFirst,
}

impl PriorityOrder {
    /// Priority, then creation time, then id
    pub fn compare(&self, a: &Bundle, b: &Bundle) -> Ordering {
        let by_priority = match self {
            PriorityOrder::HigherFirst => b.priority.cmp(&a.priority),
            PriorityOrder::LowerFirst => a.priority.cmp(&b.priority),
        };
        by_priority
            .then(a.created_at.total_cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    }
}

/// Full history of one bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleRecord {
    pub bundle: Bundle,
    pub state: BundleState,
    /// Window of the next hop, if a route is planned
    pub planned_window: Option<usize>,
    /// Nodes the bundle has been queued at, source first
    pub path: Vec<NodeId>,
    pub replans: u32,
}

impl BundleRecord {
    pub fn new(bundle: Bundle) -> Self {
        Self {
            bundle,
            state: BundleState::Pending,
            planned_window: None,
            path: Vec::new(),
            replans: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(id: u64, created_at: f64, priority: i32) -> Bundle {
        Bundle {
            id: BundleId(id),
            source: NodeId(3000),
            created_at,
            size_bytes: 100,
            lifetime_s: 60.0,
            priority,
        }
    }

    #[test]
    fn test_bundle_expiry() {
        let b = bundle(0, 10.0, 0);
        assert_eq!(b.expires_at(), 70.0);
        assert!(!b.is_expired(69.9));
        assert!(b.is_expired(70.0));
    }

    #[test]
    fn test_priority_order() {
        let low = bundle(0, 5.0, 1);
        let high = bundle(1, 10.0, 5);
        let high_early = bundle(2, 1.0, 5);

        let mut list = vec![low.clone(), high.clone(), high_early.clone()];
        list.sort_by(|a, b| PriorityOrder::HigherFirst.compare(a, b));
        let ids: Vec<u64> = list.iter().map(|b| b.id.0).collect();
        assert_eq!(ids, vec![2, 1, 0]);

        list.sort_by(|a, b| PriorityOrder::LowerFirst.compare(a, b));
        let ids: Vec<u64> = list.iter().map(|b| b.id.0).collect();
        assert_eq!(ids, vec![0, 2, 1]);
    }

    #[test]
    fn test_fifo_then_id_tiebreak() {
        let a = bundle(4, 3.0, 2);
        let b = bundle(3, 3.0, 2);
        assert_eq!(PriorityOrder::HigherFirst.compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!BundleState::Pending.is_terminal());
        assert!(BundleState::Expired { at: 1.0 }.is_terminal());
        assert!(BundleState::Dropped {
            at: 1.0,
            reason: DropReason::NoRoute
        }
        .is_terminal());
    }
}
