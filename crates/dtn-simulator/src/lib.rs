//! DTN Constellation Simulator
//!
//! Runs a satellite constellation as a delay-tolerant network over a fixed
//! horizon:
//!
//! ```text
//! scenario ─▶ propagation ─▶ visibility ─▶ contact plan ─▶ contact graph
//!                                                              │
//!            bundle generator ─▶ router / scheduler ◀──────────┘
//!                                     │
//!                          transmission ─▶ statistics
//! ```
//!
//! Every run is deterministic for a given scenario and seed.

use bundle_routing::RoutingError;
use contact_graph::ContactError;
use ground_stations::StationError;
use orbital_mechanics::{NodeId, OrbitalError};
use thiserror::Error;

pub mod config;
pub mod context;
pub mod engine;
pub mod loader;
pub mod report;

pub use config::{ConfigurationError, Scenario, Violation};
pub use context::{Network, SimulationContext};
pub use engine::{run, run_contacts};
pub use report::{ContactReport, SimulationResult};

#[derive(Error, Debug)]
pub enum SimError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Propagation failed for {node}: {source}")]
    Propagation {
        node: NodeId,
        #[source]
        source: OrbitalError,
    },
    #[error("Orbital elements rejected: {0}")]
    Orbital(OrbitalError),
    #[error("Ground node rejected: {0}")]
    Station(#[from] StationError),
    #[error("Contact graph error: {0}")]
    Contact(ContactError),
    #[error("Routing error: {0}")]
    Routing(RoutingError),
    #[error("Ledger out of balance at t = {0}")]
    Ledger(f64),
}

impl From<ContactError> for SimError {
    fn from(err: ContactError) -> Self {
        match err {
            ContactError::Propagation { node, source } => SimError::Propagation { node, source },
            other => SimError::Contact(other),
        }
    }
}

impl From<RoutingError> for SimError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::Contact(inner) => inner.into(),
            other => SimError::Routing(other),
        }
    }
}

impl From<OrbitalError> for SimError {
    fn from(err: OrbitalError) -> Self {
        SimError::Orbital(err)
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

/// First id handed to gateways
pub const GATEWAY_ID_BASE: u32 = 1000;
/// First id handed to satellites
pub const SATELLITE_ID_BASE: u32 = 2000;
/// First id handed to targets
pub const TARGET_ID_BASE: u32 = 3000;
