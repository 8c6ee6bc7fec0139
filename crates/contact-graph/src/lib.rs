//! Contact Graph
//!
//! Time-varying topology of the constellation network:
//!
//! - Fixed-step simulation clock
//! - Line-of-sight visibility between satellites and ground nodes
//! - Contact window extraction over the simulated horizon
//! - Earliest-arrival route search across the resulting contact graph

use ground_stations::{GroundNode, GroundRole};
use nalgebra::Vector3;
use orbital_mechanics::{NodeId, OrbitalError, Satellite};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod builder;
pub mod clock;
pub mod ephemeris;
pub mod graph;
pub mod visibility;

pub use builder::{ContactPlan, ContactPlanBuilder};
pub use clock::SimulationClock;
pub use graph::{ContactGraph, GraphStats, Route, RouteHop};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContactError {
    #[error("Propagation failed for {node}: {source}")]
    Propagation {
        node: NodeId,
        #[source]
        source: OrbitalError,
    },
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("Node {0} appears more than once")]
    DuplicateNode(NodeId),
    #[error("Window not found: {0}")]
    WindowNotFound(usize),
    #[error("Invalid clock: {0}")]
    InvalidClock(String),
}

pub type Result<T> = std::result::Result<T, ContactError>;

/// Role of a node in the bundle network
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Satellite,
    Gateway,
    Target,
}

/// Any endpoint of a contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NetworkNode {
    Satellite(Satellite),
    Ground(GroundNode),
}

impl NetworkNode {
    pub fn id(&self) -> NodeId {
        match self {
            NetworkNode::Satellite(sat) => sat.id,
            NetworkNode::Ground(ground) => ground.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NetworkNode::Satellite(sat) => &sat.name,
            NetworkNode::Ground(ground) => &ground.name,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NetworkNode::Satellite(_) => NodeKind::Satellite,
            NetworkNode::Ground(GroundNode {
                role: GroundRole::Gateway { .. },
                ..
            }) => NodeKind::Gateway,
            NetworkNode::Ground(GroundNode {
                role: GroundRole::Target,
                ..
            }) => NodeKind::Target,
        }
    }

    pub fn as_satellite(&self) -> Option<&Satellite> {
        match self {
            NetworkNode::Satellite(sat) => Some(sat),
            NetworkNode::Ground(_) => None,
        }
    }

    /// Inertial position (km) at `t` seconds after `epoch_jd`
    pub fn position_eci(&self, epoch_jd: f64, t: f64) -> Result<Vector3<f64>> {
        match self {
            NetworkNode::Satellite(sat) => {
                sat.position_at(epoch_jd, t)
                    .map_err(|source| ContactError::Propagation {
                        node: sat.id,
                        source,
                    })
            }
            NetworkNode::Ground(ground) => Ok(ground.position_eci(epoch_jd, t)),
        }
    }
}

/// Link types in the constellation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Inter-satellite link
    InterSatellite,
    /// Satellite to ground node (gateway or target)
    SatelliteToGround,
}

impl LinkKind {
    /// Link kind for a node pair, `None` for ground-ground
    pub fn between(a: &NetworkNode, b: &NetworkNode) -> Option<Self> {
        match (a, b) {
            (NetworkNode::Satellite(_), NetworkNode::Satellite(_)) => Some(LinkKind::InterSatellite),
            (NetworkNode::Satellite(_), NetworkNode::Ground(_))
            | (NetworkNode::Ground(_), NetworkNode::Satellite(_)) => {
                Some(LinkKind::SatelliteToGround)
            }
            (NetworkNode::Ground(_), NetworkNode::Ground(_)) => None,
        }
    }
}

/// Interval during which two nodes can exchange data.
///
/// `node_a` is always the lower id of the pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ContactWindow {
    /// Position in the contact plan
    pub index: usize,
    pub node_a: NodeId,
    pub node_b: NodeId,
    pub start: f64,
    pub end: f64,
    /// Bytes per second
    pub rate: f64,
    pub kind: LinkKind,
}

impl ContactWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Total bytes the window can carry
    pub fn capacity(&self) -> f64 {
        self.rate * self.duration()
    }

    pub fn is_active(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }

    pub fn involves(&self, node: NodeId) -> bool {
        self.node_a == node || self.node_b == node
    }

    /// Other endpoint, `None` if `node` is not on this window
    pub fn peer(&self, node: NodeId) -> Option<NodeId> {
        if self.node_a == node {
            Some(self.node_b)
        } else if self.node_b == node {
            Some(self.node_a)
        } else {
            None
        }
    }

    pub fn pair(&self) -> (NodeId, NodeId) {
        (self.node_a, self.node_b)
    }
}
